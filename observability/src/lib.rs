//! Tracing initialization shared by every pixslab process.

use error_stack::{Result, ResultExt};
use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

#[derive(Debug)]
pub struct ObservabilityInitError;
impl error_stack::Context for ObservabilityInitError {}

impl std::fmt::Display for ObservabilityInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize tracing")
    }
}

/// Initialize tracing for the current process.
///
/// Should be called once during application startup. Filtering follows
/// `RUST_LOG`, defaulting to `info` when the variable is unset.
pub fn init_tracing() -> Result<(), ObservabilityInitError> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    let env_filter = EnvFilter::try_from_default_env().change_context(ObservabilityInitError)?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .change_context(ObservabilityInitError)?;

    Ok(())
}
