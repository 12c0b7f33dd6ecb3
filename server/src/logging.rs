//! Tracing subscriber setup for the server binary.

use inbox_cleaner::LogFormat;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to set global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init(format: LogFormat) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_log::LogTracer::init()?;

    match format {
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_target(true));
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
