use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use inbox_cleaner::db::DatabaseError;
use inbox_cleaner::provider::{
    AccessTokenSource, MailProvider, MessageMetadata, MessagePage, ProviderError,
};
use inbox_cleaner::scan::CancelFlag;
use secrecy::SecretString;

/// One recorded `list_messages` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub query: String,
    pub page_size: usize,
    pub page_token: Option<String>,
}

/// A provider that answers from queued pages and a metadata table.
///
/// Once the page queue is drained, listing returns an empty page.
/// Unknown ids get metadata without headers.
#[derive(Default)]
pub struct ScriptedProvider {
    pages: Mutex<VecDeque<Result<MessagePage, ProviderError>>>,
    metadata: Mutex<HashMap<String, MessageMetadata>>,
    metadata_failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    list_calls: Mutex<Vec<ListCall>>,
    fetch_calls: AtomicUsize,
    cancel_on_list: Mutex<Option<CancelFlag>>,
    list_delay: Mutex<Option<Duration>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: MessagePage) -> &Self {
        self.pages.lock().unwrap().push_back(Ok(page));
        self
    }

    pub fn push_list_error(&self, err: ProviderError) -> &Self {
        self.pages.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn add_metadata(&self, meta: MessageMetadata) -> &Self {
        self.metadata.lock().unwrap().insert(meta.id.clone(), meta);
        self
    }

    /// Makes the next fetch of `id` fail with `err`.
    pub fn fail_metadata(&self, id: &str, err: ProviderError) -> &Self {
        self.metadata_failures
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(err);
        self
    }

    /// Sets `flag` as soon as the first page is listed.
    pub fn cancel_on_first_list(&self, flag: CancelFlag) -> &Self {
        *self.cancel_on_list.lock().unwrap() = Some(flag);
        self
    }

    /// Delays every listing call by `delay`.
    pub fn delay_lists(&self, delay: Duration) -> &Self {
        *self.list_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn list_calls(&self) -> Vec<ListCall> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailProvider for ScriptedProvider {
    async fn list_messages(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ProviderError> {
        self.list_calls.lock().unwrap().push(ListCall {
            query: query.to_string(),
            page_size,
            page_token: page_token.map(String::from),
        });
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(flag) = self.cancel_on_list.lock().unwrap().take() {
            flag.cancel();
        }
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(MessagePage::default()))
    }

    async fn fetch_metadata(
        &self,
        id: &str,
        _headers: &[&str],
    ) -> Result<MessageMetadata, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .metadata_failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(self
            .metadata
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| MessageMetadata {
                id: id.to_string(),
                thread_id: format!("thread-{}", id),
                headers: HashMap::new(),
            }))
    }
}

/// A token source whose credential availability is fixed.
pub struct StaticTokenSource {
    authenticated: bool,
}

impl StaticTokenSource {
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
        }
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn has_credentials(&self) -> Result<bool, DatabaseError> {
        Ok(self.authenticated)
    }

    async fn access_token(&self) -> Result<SecretString, ProviderError> {
        if self.authenticated {
            Ok(SecretString::from("test-access-token"))
        } else {
            Err(ProviderError::Unauthenticated("test source".to_string()))
        }
    }
}
