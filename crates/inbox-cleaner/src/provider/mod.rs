//! Mail provider capability.
//!
//! The scan loop only needs two calls from a mailbox: a paginated id
//! listing and a per-message metadata fetch. [`GmailProvider`] implements
//! them against the Gmail REST API; tests substitute scripted providers.

use std::collections::HashMap;

use async_trait::async_trait;

pub mod auth;
pub mod error;
pub mod gmail;

pub use auth::{AccessTokenSource, StoredTokenSource};
pub use error::{ProviderError, RetryConfig, RetryPolicy};
pub use gmail::GmailProvider;

/// Largest page size a provider is asked for.
pub const MAX_PAGE_SIZE: usize = 200;

/// One page of message identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Requested headers of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: String,
    /// Header values keyed by lower-cased header name.
    pub headers: HashMap<String, String>,
}

impl MessageMetadata {
    /// Looks up a header value, ignoring the case of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A mailbox that can be enumerated page by page.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists message ids matching `query`. `page_size` never exceeds
    /// [`MAX_PAGE_SIZE`]; `page_token` resumes a previous listing.
    async fn list_messages(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ProviderError>;

    /// Fetches the named headers of one message.
    async fn fetch_metadata(
        &self,
        id: &str,
        headers: &[&str],
    ) -> Result<MessageMetadata, ProviderError>;
}
