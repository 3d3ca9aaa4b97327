//! Shared domain types for the Tally project.

pub mod config;
pub mod player;
pub mod update;

mod errors;

pub use errors::{Result, TallyError};
