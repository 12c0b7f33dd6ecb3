//! Paginated scan loop.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use super::coordinator::CancelFlag;
use super::error::ScanError;
use super::identity::normalize_sender;
use super::store::{AggregateStore, PageBatch};
use super::unsubscribe::UnsubscribeSignal;
use crate::provider::{MailProvider, ProviderError, RetryConfig, MAX_PAGE_SIZE};

/// Largest number of ids requested per page.
pub const PAGE_CAP: usize = MAX_PAGE_SIZE;

/// Headers fetched for every message.
pub const METADATA_HEADERS: [&str; 3] = ["From", "List-Unsubscribe", "List-Unsubscribe-Post"];

/// Parameters of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Look-back window in days.
    pub days: u32,
    /// Maximum number of messages to process.
    pub limit: usize,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            days: 30,
            limit: 100,
        }
    }
}

impl ScanRequest {
    /// Provider search query for unread inbox mail inside the window.
    pub fn query(&self) -> String {
        format!("is:unread in:inbox newer_than:{}d", self.days)
    }
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    /// The listing was exhausted.
    #[serde(rename = "ok")]
    Ok,
    /// `limit` messages were processed.
    #[serde(rename = "limit reached")]
    LimitReached,
    /// The cancel flag was set before the next page.
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Ok => "ok",
            ScanStatus::LimitReached => "limit reached",
            ScanStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub status: ScanStatus,
    /// Messages committed to the store.
    pub processed: usize,
    pub pages_committed: usize,
    pub senders_created: usize,
    /// Committed ids that were already stored.
    pub duplicates: usize,
}

/// Walks the provider listing page by page and feeds the aggregate store.
pub struct InboxScanner {
    provider: Arc<dyn MailProvider>,
    store: AggregateStore,
    retry: RetryConfig,
    cancel: CancelFlag,
}

impl InboxScanner {
    pub fn new(provider: Arc<dyn MailProvider>, store: AggregateStore) -> Self {
        Self {
            provider,
            store,
            retry: RetryConfig::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs a scan to completion.
    ///
    /// Each page is committed in one transaction. On error, pages committed
    /// before the failing one stay committed and the failing page leaves
    /// no trace.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let span = info_span!("scan", days = request.days, limit = request.limit);
        self.scan_pages(request).instrument(span).await
    }

    async fn scan_pages(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let query = request.query();
        let query = query.as_str();
        let limit = request.limit;

        let mut report = ScanReport {
            status: ScanStatus::Ok,
            processed: 0,
            pages_committed: 0,
            senders_created: 0,
            duplicates: 0,
        };
        let mut page_token: Option<String> = None;

        info!(query, "Starting inbox scan");

        report.status = loop {
            if report.processed >= limit {
                break ScanStatus::LimitReached;
            }
            if self.cancel.is_cancelled() {
                info!(processed = report.processed, "Scan cancelled");
                break ScanStatus::Cancelled;
            }

            let remaining = limit - report.processed;
            let page_size = remaining.min(PAGE_CAP);
            let token = page_token.as_deref();
            let page = self
                .call_with_retry("list_messages", || {
                    self.provider.list_messages(query, page_size, token)
                })
                .await?;

            if page.ids.is_empty() {
                break ScanStatus::Ok;
            }

            // Providers may return more ids than asked for.
            let take = page.ids.len().min(remaining);
            let mut batch = PageBatch::with_capacity(take);
            for id in page.ids.iter().take(take) {
                let id = id.as_str();
                let meta = self
                    .call_with_retry("fetch_metadata", || {
                        self.provider.fetch_metadata(id, &METADATA_HEADERS)
                    })
                    .await?;

                let sender = normalize_sender(meta.header("from"));
                let signal = UnsubscribeSignal::from_headers(
                    meta.header("list-unsubscribe"),
                    meta.header("list-unsubscribe-post"),
                );
                batch.stage(sender, signal, id, meta.thread_id);
            }

            let outcome = self.store.commit(batch)?;
            report.processed += take;
            report.pages_committed += 1;
            report.senders_created += outcome.senders_created;
            report.duplicates += outcome.duplicates;

            debug!(
                page = report.pages_committed,
                page_ids = take,
                processed = report.processed,
                "Committed scan page"
            );

            if report.processed >= limit {
                break ScanStatus::LimitReached;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break ScanStatus::Ok,
            }
        };

        info!(
            status = %report.status,
            processed = report.processed,
            pages = report.pages_committed,
            senders_created = report.senders_created,
            "Inbox scan finished"
        );

        Ok(report)
    }

    /// Runs a provider call, retrying per the error's retry policy.
    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt, &err);
                    warn!(
                        operation,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for InboxScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxScanner")
            .field("store", &self.store)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
