//! Inbox scanning: sender identity, unsubscribe signals, the paginated
//! scan loop and the aggregate store it feeds.

pub mod coordinator;
pub mod error;
pub mod identity;
pub mod scanner;
pub mod service;
pub mod store;
pub mod unsubscribe;

pub use coordinator::{CancelFlag, ScanCoordinator, ScanGuard};
pub use error::ScanError;
pub use identity::normalize_sender;
pub use scanner::{InboxScanner, ScanReport, ScanRequest, ScanStatus, METADATA_HEADERS, PAGE_CAP};
pub use service::ScanService;
pub use store::{AggregateStore, CommitOutcome, CountingMode, PageBatch, StagedMessage};
pub use unsubscribe::UnsubscribeSignal;
