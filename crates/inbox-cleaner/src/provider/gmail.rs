//! Gmail REST API (v1) provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::auth::AccessTokenSource;
use super::error::ProviderError;
use super::{MailProvider, MessageMetadata, MessagePage, MAX_PAGE_SIZE};

/// Default Gmail API base URL.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

/// Gmail provider authenticated through an [`AccessTokenSource`].
pub struct GmailProvider {
    http: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl std::fmt::Debug for GmailProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GmailProvider {
    /// Creates a provider against the public Gmail API.
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_API_BASE, tokens)
    }

    /// Creates a provider against a custom API base (e.g. a local mock).
    pub fn with_base_url(
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ProviderError::TransientNetwork(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.base_url)
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    async fn list_messages(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, ProviderError> {
        let token = self.tokens.access_token().await?;
        let max_results = page_size.min(MAX_PAGE_SIZE).to_string();

        let mut params = vec![("q", query), ("maxResults", max_results.as_str())];
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token));
        }

        let response = self
            .http
            .get(self.messages_url())
            .bearer_auth(token.expose_secret())
            .query(&params)
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let page = parse_message_page(&body)?;
        debug!(
            ids = page.ids.len(),
            has_next = page.next_page_token.is_some(),
            "Listed message page"
        );
        Ok(page)
    }

    async fn fetch_metadata(
        &self,
        id: &str,
        headers: &[&str],
    ) -> Result<MessageMetadata, ProviderError> {
        let token = self.tokens.access_token().await?;

        let mut params = vec![("format", "metadata")];
        params.extend(headers.iter().map(|h| ("metadataHeaders", *h)));

        let response = self
            .http
            .get(metadata_url(&self.messages_url(), id)?)
            .bearer_auth(token.expose_secret())
            .query(&params)
            .send()
            .await?;

        let body = read_success_body(response).await?;
        parse_metadata(&body)
    }
}

/// Appends `id` to the messages URL as one escaped path segment.
fn metadata_url(messages_url: &str, id: &str) -> Result<Url, ProviderError> {
    let mut url = Url::parse(messages_url).map_err(|e| {
        ProviderError::MalformedResponse(format!("invalid API base '{}': {}", messages_url, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            ProviderError::MalformedResponse(format!("API base '{}' cannot hold a path", messages_url))
        })?
        .push(id);
    Ok(url)
}

/// Returns the body of a 2xx response, or the mapped error otherwise.
async fn read_success_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.text().await?);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), &body, retry_after))
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid {}: {}", what, e)))
}

/// Parses a `users.messages.list` response body.
pub fn parse_message_page(body: &str) -> Result<MessagePage, ProviderError> {
    let list: MessageListResponse = decode(body, "message list")?;
    Ok(MessagePage {
        ids: list.messages.into_iter().map(|m| m.id).collect(),
        next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
    })
}

/// Parses a `users.messages.get?format=metadata` response body.
///
/// Header names are lower-cased. When a header repeats, the first value
/// is kept.
pub fn parse_metadata(body: &str) -> Result<MessageMetadata, ProviderError> {
    let detail: MessageDetail = decode(body, "message metadata")?;

    let mut headers = HashMap::new();
    for header in detail.payload.map(|p| p.headers).unwrap_or_default() {
        headers
            .entry(header.name.to_ascii_lowercase())
            .or_insert(header.value);
    }

    Ok(MessageMetadata {
        id: detail.id,
        thread_id: detail.thread_id,
        headers,
    })
}
