use thiserror::Error;

pub type Result<T, E = TallyError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
///
/// A missing player is not represented here: it is a displayable tracker
/// state, not a failure.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("stats parse error: {0}")]
    Parse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
