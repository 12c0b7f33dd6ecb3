//! Mail provider error types and retry policy.

use std::time::Duration;

use thiserror::Error;

/// Longest provider response body kept in an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Upper bound for a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Errors returned by a [`MailProvider`](super::MailProvider) or an
/// [`AccessTokenSource`](super::AccessTokenSource).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No usable credentials, or the provider rejected them.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// The provider asked us to slow down.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection failure, timeout or 5xx.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The provider answered with something we could not use.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Stored credentials could not be read or written.
    #[error("credential store error: {0}")]
    CredentialStore(String),
}

/// Whether a failed provider call may be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Never,
    Backoff,
}

impl ProviderError {
    /// Retry policy per error kind:
    ///
    /// | kind | policy |
    /// |---|---|
    /// | `Unauthenticated` | never |
    /// | `MalformedResponse` | never |
    /// | `CredentialStore` | never |
    /// | `RateLimited` | exponential backoff |
    /// | `TransientNetwork` | exponential backoff |
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::TransientNetwork(_) => {
                RetryPolicy::Backoff
            }
            ProviderError::Unauthenticated(_)
            | ProviderError::MalformedResponse(_)
            | ProviderError::CredentialStore(_) => RetryPolicy::Never,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_policy() == RetryPolicy::Backoff
    }

    /// Maps a non-success HTTP status to an error kind.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let body = truncate_body(body);
        match status {
            401 | 403 => ProviderError::Unauthenticated(format!("HTTP {}: {}", status, body)),
            429 => ProviderError::RateLimited { retry_after },
            500..=599 => ProviderError::TransientNetwork(format!("HTTP {}: {}", status, body)),
            _ => ProviderError::MalformedResponse(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::TransientNetwork(err.to_string())
        }
    }
}

impl From<crate::db::DatabaseError> for ProviderError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ProviderError::CredentialStore(err.to_string())
    }
}

/// Truncates a response body so tokens or large payloads never flood logs.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

/// Bounds for retrying provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based) after `err`.
    ///
    /// A `Retry-After` hint from the provider wins when it is longer than
    /// the computed backoff.
    pub fn delay_for(&self, attempt: u32, err: &ProviderError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF);
        match err {
            ProviderError::RateLimited {
                retry_after: Some(hint),
            } => backoff.max((*hint).min(MAX_BACKOFF)),
            _ => backoff,
        }
    }
}
