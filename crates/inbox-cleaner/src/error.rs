use thiserror::Error;

use crate::provider::ProviderError;
use crate::scan::ScanError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum InboxCleanerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required setting '{key}' is empty")]
    Missing { key: &'static str },

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to resolve secret: {0}")]
    Secret(#[from] SecretError),
}

pub type Result<T> = std::result::Result<T, InboxCleanerError>;
