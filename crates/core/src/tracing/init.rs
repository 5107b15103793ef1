//! Initialization functions for tracing

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{CoreError, CoreResult};
use crate::tracing::config::{InstrumentationConfig, LogFormat};

/// Build the level filter, preferring `RUST_LOG` over the configured level
fn env_filter(config: &InstrumentationConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with the given configuration
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed
pub fn init_tracing(config: &InstrumentationConfig) -> CoreResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = match (config.format, config.stderr) {
        (LogFormat::Json, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (LogFormat::Json, false) => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        (LogFormat::Pretty, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        (LogFormat::Pretty, false) => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| CoreError::invalid_config(format!("Failed to install subscriber: {e}")))?;

    tracing::debug!(service = %config.service_name, "tracing initialised");
    Ok(())
}

/// Initialize with default configuration from environment
pub fn init_default() -> CoreResult<()> {
    let config = InstrumentationConfig::from_env();
    init_tracing(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let config = InstrumentationConfig::dev();
        // The first call may race with other tests installing a subscriber,
        // but a second call in the same process must always fail.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(CoreError::InvalidConfig { .. })
        ));
    }
}
