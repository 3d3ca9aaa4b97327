//! Operational helpers: logging initialization.

use tally_types::{config::OpsConfig, Result, TallyError};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TallyError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| TallyError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}
