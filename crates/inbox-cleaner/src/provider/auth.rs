//! Access token sources for the Gmail API.
//!
//! [`StoredTokenSource`] keeps the owner's OAuth token in the
//! `oauth_tokens` table and refreshes it at the Google token endpoint
//! (`grant_type=refresh_token`) when it is about to expire.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use super::error::{truncate_body, ProviderError};
use crate::config::Settings;
use crate::db::oauth_repo::{self, OAuthTokenRow};
use crate::db::{Database, DatabaseError};

/// Default Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// A stored token expiring within this many seconds is refreshed first.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Reported lifetimes are capped at one day.
const MAX_EXPIRES_IN_SECS: u64 = 86_400;

const PROVIDER_NAME: &str = "google";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplies bearer tokens for provider calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Whether usable credentials exist. Never touches the network.
    async fn has_credentials(&self) -> Result<bool, DatabaseError>;

    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<SecretString, ProviderError>;
}

/// Response from the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Token source backed by the `oauth_tokens` table.
pub struct StoredTokenSource {
    db: Database,
    http: Client,
    owner_email: String,
    client_id: String,
    client_secret: SecretString,
    token_url: String,
    bootstrap_refresh_token: Option<SecretString>,
    // Serializes refreshes so concurrent callers don't race the endpoint.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for StoredTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokenSource")
            .field("owner_email", &self.owner_email)
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("has_bootstrap", &self.bootstrap_refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

impl StoredTokenSource {
    pub fn new(
        db: Database,
        owner_email: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        token_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ProviderError::TransientNetwork(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            db,
            http,
            owner_email: owner_email.into(),
            client_id: client_id.into(),
            client_secret,
            token_url: token_url.into(),
            bootstrap_refresh_token: None,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Builds the source from application settings.
    pub fn from_settings(db: Database, settings: &Settings) -> Result<Self, ProviderError> {
        let source = Self::new(
            db,
            settings.owner_email.clone(),
            settings.google_client_id.clone(),
            copy_secret(&settings.google_client_secret),
            settings.google_token_url.clone(),
        )?;
        let bootstrap = settings.google_refresh_token.as_ref().map(copy_secret);
        Ok(source.with_bootstrap_refresh_token(bootstrap))
    }

    /// Refresh token used when no token row is stored yet.
    pub fn with_bootstrap_refresh_token(mut self, token: Option<SecretString>) -> Self {
        self.bootstrap_refresh_token = token;
        self
    }

    pub fn owner_email(&self) -> &str {
        &self.owner_email
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<SecretString, ProviderError> {
        info!(owner = %self.owner_email, "Refreshing access token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::TransientNetwork(format!("token refresh failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // invalid_grant and friends come back as 400.
            if status.as_u16() == 400 {
                return Err(ProviderError::Unauthenticated(format!(
                    "token refresh rejected: {}",
                    truncate_body(&body)
                )));
            }
            return Err(ProviderError::from_status(status.as_u16(), &body, None));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("failed to parse refresh response: {}", e))
        })?;

        let now = Utc::now();
        let expires_at = token_expiry(now, token.expires_in);
        let row = OAuthTokenRow {
            owner_email: self.owner_email.clone(),
            provider: PROVIDER_NAME.to_string(),
            access_token: token.access_token.clone(),
            // The endpoint usually omits the refresh token; keep ours.
            refresh_token: Some(
                token
                    .refresh_token
                    .unwrap_or_else(|| refresh_token.expose_secret().to_string()),
            ),
            expires_at: expires_at.to_rfc3339(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };
        oauth_repo::upsert(&self.db, &row)?;

        info!(owner = %self.owner_email, "Access token refreshed");
        Ok(SecretString::from(token.access_token))
    }
}

fn token_expiry(now: DateTime<Utc>, expires_in: Option<u64>) -> DateTime<Utc> {
    let secs = expires_in
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
        .min(MAX_EXPIRES_IN_SECS);
    // Capped, so the addition cannot overflow.
    now + TimeDelta::seconds(secs as i64)
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

#[async_trait]
impl AccessTokenSource for StoredTokenSource {
    async fn has_credentials(&self) -> Result<bool, DatabaseError> {
        if self.bootstrap_refresh_token.is_some() {
            return Ok(true);
        }
        let stored = oauth_repo::find(&self.db, &self.owner_email)?;
        Ok(stored.is_some_and(|row| row.can_refresh() || !row.is_expired(EXPIRY_BUFFER_SECS)))
    }

    async fn access_token(&self) -> Result<SecretString, ProviderError> {
        let _guard = self.refresh_lock.lock().await;

        match oauth_repo::find(&self.db, &self.owner_email)? {
            Some(row) if !row.is_expired(EXPIRY_BUFFER_SECS) => {
                Ok(SecretString::from(row.access_token))
            }
            Some(row) => match row.refresh_token {
                Some(refresh_token) => self.refresh(&SecretString::from(refresh_token)).await,
                None => match &self.bootstrap_refresh_token {
                    Some(bootstrap) => self.refresh(bootstrap).await,
                    None => {
                        warn!(owner = %self.owner_email, "Stored token expired and cannot be refreshed");
                        Err(ProviderError::Unauthenticated(
                            "stored token expired without a refresh token".to_string(),
                        ))
                    }
                },
            },
            None => match &self.bootstrap_refresh_token {
                Some(bootstrap) => self.refresh(bootstrap).await,
                None => Err(ProviderError::Unauthenticated(format!(
                    "no credentials stored for {}",
                    self.owner_email
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "owner@example.com";

    #[test]
    fn test_token_expiry_is_clamped() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, None), now + TimeDelta::seconds(3600));
        assert_eq!(token_expiry(now, Some(120)), now + TimeDelta::seconds(120));
        assert_eq!(
            token_expiry(now, Some(u64::MAX)),
            now + TimeDelta::seconds(86_400)
        );
        assert_eq!(
            token_expiry(now, Some(i64::MAX as u64 / 1000 + 1)),
            now + TimeDelta::seconds(86_400)
        );
    }

    fn source(db: &Database, token_url: &str) -> StoredTokenSource {
        StoredTokenSource::new(
            db.clone(),
            OWNER,
            "client-id",
            SecretString::from("client-secret"),
            token_url,
        )
        .unwrap()
    }

    fn store_token(db: &Database, expires_in_secs: i64, refresh_token: Option<&str>) {
        let now = Utc::now();
        let row = OAuthTokenRow {
            owner_email: OWNER.to_string(),
            provider: PROVIDER_NAME.to_string(),
            access_token: "stored-access".to_string(),
            refresh_token: refresh_token.map(String::from),
            expires_at: (now + chrono::Duration::seconds(expires_in_secs)).to_rfc3339(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };
        oauth_repo::upsert(db, &row).unwrap();
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let db = Database::open_in_memory().unwrap();
        let tokens = source(&db, DEFAULT_TOKEN_URL);
        assert!(!tokens.has_credentials().await.unwrap());
        assert!(matches!(
            tokens.access_token().await,
            Err(ProviderError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_valid_stored_token_is_returned() {
        let db = Database::open_in_memory().unwrap();
        store_token(&db, 3600, None);
        let tokens = source(&db, DEFAULT_TOKEN_URL);
        assert!(tokens.has_credentials().await.unwrap());
        assert_eq!(tokens.access_token().await.unwrap().expose_secret(), "stored-access");
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh() {
        let db = Database::open_in_memory().unwrap();
        store_token(&db, -10, None);
        let tokens = source(&db, DEFAULT_TOKEN_URL);
        assert!(!tokens.has_credentials().await.unwrap());
        assert!(matches!(
            tokens.access_token().await,
            Err(ProviderError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_token_counts_as_credentials() {
        let db = Database::open_in_memory().unwrap();
        let tokens = source(&db, DEFAULT_TOKEN_URL)
            .with_bootstrap_refresh_token(Some(SecretString::from("bootstrap")));
        assert!(tokens.has_credentials().await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_is_transient() {
        let db = Database::open_in_memory().unwrap();
        store_token(&db, -10, Some("refresh-me"));
        // Nothing listens on port 1.
        let tokens = source(&db, "http://127.0.0.1:1/token");
        assert!(tokens.has_credentials().await.unwrap());
        let err = tokens.access_token().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let db = Database::open_in_memory().unwrap();
        let tokens = source(&db, DEFAULT_TOKEN_URL)
            .with_bootstrap_refresh_token(Some(SecretString::from("bootstrap-secret")));
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("client-secret"));
        assert!(!debug.contains("bootstrap-secret"));
    }
}
