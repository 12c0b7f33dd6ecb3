//! Scan orchestration for one mailbox owner.
//!
//! [`ScanService`] guards the credential check and the per-owner
//! single-flight slot, runs the scan on its own task and records the
//! outcome in the audit log.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use super::coordinator::ScanCoordinator;
use super::error::ScanError;
use super::scanner::{InboxScanner, ScanReport, ScanRequest};
use super::store::AggregateStore;
use crate::db::audit_repo;
use crate::provider::{AccessTokenSource, MailProvider, ProviderError, RetryConfig};

pub const EVENT_SCAN_COMPLETED: &str = "scan_completed";
pub const EVENT_SCAN_FAILED: &str = "scan_failed";

#[derive(Clone)]
pub struct ScanService {
    provider: Arc<dyn MailProvider>,
    tokens: Arc<dyn AccessTokenSource>,
    store: AggregateStore,
    retry: RetryConfig,
    coordinator: ScanCoordinator,
    owner: String,
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("owner", &self.owner)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ScanService {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        tokens: Arc<dyn AccessTokenSource>,
        store: AggregateStore,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tokens,
            store,
            retry: RetryConfig::default(),
            coordinator: ScanCoordinator::new(),
            owner: owner.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.coordinator
    }

    /// Fails with `Unauthenticated` unless credentials are available.
    /// Never touches the network.
    pub async fn require_credentials(&self) -> Result<(), ScanError> {
        if self.tokens.has_credentials().await? {
            Ok(())
        } else {
            Err(ScanError::Provider(ProviderError::Unauthenticated(format!(
                "no credentials for {}",
                self.owner
            ))))
        }
    }

    /// Runs one scan for the owner and waits for it to finish.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        self.require_credentials().await?;

        let guard = self.coordinator.try_begin(&self.owner)?;
        let scanner = InboxScanner::new(Arc::clone(&self.provider), self.store.clone())
            .with_retry(self.retry)
            .with_cancel_flag(guard.cancel_flag());

        let store = self.store.clone();
        let owner = self.owner.clone();
        // Outcome is recorded on the task, independent of the caller.
        let handle = tokio::spawn(async move {
            let result = scanner.scan(request).await;
            record_outcome(&store, &owner, &request, &result);
            drop(guard);
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let result = Err(ScanError::Aborted(e.to_string()));
                record_outcome(&self.store, &self.owner, &request, &result);
                result
            }
        }
    }

    /// Requests cancellation of the owner's running scan.
    pub fn cancel(&self) -> bool {
        let cancelled = self.coordinator.cancel(&self.owner);
        if cancelled {
            info!(owner = %self.owner, "Scan cancellation requested");
        }
        cancelled
    }

}

fn record_outcome(
    store: &AggregateStore,
    owner: &str,
    request: &ScanRequest,
    result: &Result<ScanReport, ScanError>,
) {
    let (event, payload) = match result {
        Ok(report) => (
            EVENT_SCAN_COMPLETED,
            json!({
                "owner": owner,
                "days": request.days,
                "limit": request.limit,
                "status": report.status,
                "processed": report.processed,
                "pages": report.pages_committed,
                "senders_created": report.senders_created,
            }),
        ),
        Err(err) => {
            error!(owner = %owner, error = %err, "Scan failed");
            (
                EVENT_SCAN_FAILED,
                json!({
                    "owner": owner,
                    "days": request.days,
                    "limit": request.limit,
                    "error": err.to_string(),
                }),
            )
        }
    };

    // The scan outcome stands even if the audit write fails.
    if let Err(e) = audit_repo::insert(store.database(), event, &payload) {
        warn!(error = %e, "Failed to record scan audit event");
    }
}
