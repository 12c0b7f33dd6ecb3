pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod provider;
pub mod report;
pub mod scan;
pub mod secrets;

pub use api::{router, serve, ApiError, AppState};
pub use config::{LogFormat, Settings};
pub use db::{Database, DatabaseError, DatabaseLocation};
pub use error::{ConfigError, InboxCleanerError, Result};
pub use provider::{
    AccessTokenSource, GmailProvider, MailProvider, MessageMetadata, MessagePage, ProviderError,
    RetryConfig, StoredTokenSource,
};
pub use scan::{
    normalize_sender, AggregateStore, CountingMode, InboxScanner, ScanCoordinator, ScanError,
    ScanReport, ScanRequest, ScanService, ScanStatus, UnsubscribeSignal,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
