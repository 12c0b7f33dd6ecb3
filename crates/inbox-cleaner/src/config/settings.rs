//! Application settings loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::db::DatabaseLocation;
use crate::error::ConfigError;
use crate::provider::auth::DEFAULT_TOKEN_URL;
use crate::provider::gmail::DEFAULT_API_BASE;
use crate::provider::RetryConfig;
use crate::scan::CountingMode;
use crate::secrets;

pub const DEFAULT_APP_NAME: &str = "Gmail Inbox Cleaner";
pub const DEFAULT_OWNER_EMAIL: &str = "owner@example.com";
pub const DEFAULT_CLIENT_ID: &str = "dummy-client-id";
pub const DEFAULT_CLIENT_SECRET: &str = "dummy-client-secret";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost/oauth/callback";
pub const DEFAULT_SCOPES: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const DEFAULT_DATABASE_URL: &str = "sqlite+aiosqlite:///./app.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// URL prefixes accepted in `DATABASE_URL`, longest first.
const SQLITE_URL_PREFIXES: &[&str] = &["sqlite+aiosqlite:///", "sqlite:///", "sqlite://"];

/// Log output format for the server binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{}'", other)),
        }
    }
}

/// Runtime configuration.
#[derive(Debug)]
pub struct Settings {
    pub app_name: String,
    pub owner_email: String,
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub google_redirect_uri: String,
    pub google_scopes: Vec<String>,
    /// Refresh token used to bootstrap the token store.
    pub google_refresh_token: Option<SecretString>,
    pub google_token_url: String,
    pub database: DatabaseLocation,
    /// Run schema migrations at startup.
    pub dev_create_all: bool,
    pub bind_addr: SocketAddr,
    pub counting_mode: CountingMode,
    pub retry: RetryConfig,
    pub gmail_api_base: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let get_or = |key: &str, default: &str| {
            get(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let owner_email = match get("OWNER_EMAIL") {
            None => DEFAULT_OWNER_EMAIL.to_string(),
            Some(v) if v.is_empty() => return Err(ConfigError::Missing { key: "OWNER_EMAIL" }),
            Some(v) => v,
        };

        let client_secret_direct = get("GOOGLE_CLIENT_SECRET");
        let client_secret_file = get("GOOGLE_CLIENT_SECRET_FILE");
        let google_client_secret = secrets::resolve_secret_optional(
            client_secret_direct.as_deref(),
            client_secret_file.as_deref(),
        )?
        .unwrap_or_else(|| SecretString::from(DEFAULT_CLIENT_SECRET));

        let refresh_direct = get("GOOGLE_REFRESH_TOKEN");
        let refresh_file = get("GOOGLE_REFRESH_TOKEN_FILE");
        let google_refresh_token =
            secrets::resolve_secret_optional(refresh_direct.as_deref(), refresh_file.as_deref())?;

        let google_scopes = get_or("GOOGLE_SCOPES", DEFAULT_SCOPES)
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let database_url = get_or("DATABASE_URL", DEFAULT_DATABASE_URL);
        let database = parse_database_url(&database_url)
            .map_err(|reason| invalid("DATABASE_URL", &database_url, reason))?;

        let bind_raw = get_or("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", &bind_raw, e.to_string()))?;

        let counting_mode = if parse_bool_key(&get, "COUNT_DUPLICATE_MESSAGES", true)? {
            CountingMode::EveryEncounter
        } else {
            CountingMode::FirstSeenOnly
        };

        let defaults = RetryConfig::default();
        let max_retries = parse_number_key(&get, "PROVIDER_MAX_RETRIES", defaults.max_retries)?;
        let base_ms = parse_number_key(
            &get,
            "PROVIDER_RETRY_BASE_MS",
            defaults.base_delay.as_millis() as u64,
        )?;

        let log_raw = get_or("LOG_FORMAT", "text");
        let log_format = log_raw
            .parse::<LogFormat>()
            .map_err(|reason| invalid("LOG_FORMAT", &log_raw, reason))?;

        Ok(Self {
            app_name: get_or("APP_NAME", DEFAULT_APP_NAME),
            owner_email,
            google_client_id: get_or("GOOGLE_CLIENT_ID", DEFAULT_CLIENT_ID),
            google_client_secret,
            google_redirect_uri: get_or("GOOGLE_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            google_scopes,
            google_refresh_token,
            google_token_url: get_or("GOOGLE_TOKEN_URL", DEFAULT_TOKEN_URL),
            database,
            dev_create_all: parse_bool_key(&get, "DEV_CREATE_ALL", true)?,
            bind_addr,
            counting_mode,
            retry: RetryConfig {
                max_retries,
                base_delay: Duration::from_millis(base_ms),
            },
            gmail_api_base: get_or("GMAIL_API_BASE", DEFAULT_API_BASE),
            log_format,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool_key<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| invalid(key, &raw, "expected true/false, 1/0 or yes/no")),
    }
}

fn parse_number_key<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| invalid(key, &raw, e.to_string())),
    }
}

/// Parses a boolean flag, case-insensitively.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Turns a `DATABASE_URL` into a database location.
///
/// SQLAlchemy-style `sqlite://` URLs are accepted, so the path in
/// `sqlite+aiosqlite:///./app.db` resolves to `./app.db`. A bare path is
/// taken as a file path.
pub fn parse_database_url(url: &str) -> Result<DatabaseLocation, String> {
    let url = url.trim();
    let path = SQLITE_URL_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .unwrap_or(url);

    if path == ":memory:" {
        return Ok(DatabaseLocation::Memory);
    }
    if path.is_empty() {
        return Err("database path is empty".to_string());
    }
    if path.contains("://") {
        return Err("only sqlite databases are supported".to_string());
    }
    Ok(DatabaseLocation::File(PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.app_name, DEFAULT_APP_NAME);
        assert_eq!(settings.owner_email, DEFAULT_OWNER_EMAIL);
        assert_eq!(settings.google_client_id, DEFAULT_CLIENT_ID);
        assert_eq!(settings.google_client_secret.expose_secret(), DEFAULT_CLIENT_SECRET);
        assert_eq!(settings.google_scopes, vec![DEFAULT_SCOPES.to_string()]);
        assert!(settings.google_refresh_token.is_none());
        assert_eq!(
            settings.database,
            DatabaseLocation::File(PathBuf::from("./app.db"))
        );
        assert!(settings.dev_create_all);
        assert_eq!(settings.bind_addr.port(), 8000);
        assert_eq!(settings.counting_mode, CountingMode::EveryEncounter);
        assert_eq!(settings.retry, RetryConfig::default());
        assert_eq!(settings.gmail_api_base, DEFAULT_API_BASE);
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let settings = load(&[
            ("APP_NAME", "Cleaner"),
            ("OWNER_EMAIL", "me@mail.com"),
            ("DATABASE_URL", "sqlite://:memory:"),
            ("DEV_CREATE_ALL", "No"),
            ("COUNT_DUPLICATE_MESSAGES", "0"),
            ("PROVIDER_MAX_RETRIES", "0"),
            ("PROVIDER_RETRY_BASE_MS", "10"),
            ("LOG_FORMAT", "JSON"),
            ("GOOGLE_SCOPES", "a b,c"),
            ("GOOGLE_REFRESH_TOKEN", "1//refresh"),
        ])
        .unwrap();
        assert_eq!(settings.app_name, "Cleaner");
        assert_eq!(settings.owner_email, "me@mail.com");
        assert_eq!(settings.database, DatabaseLocation::Memory);
        assert!(!settings.dev_create_all);
        assert_eq!(settings.counting_mode, CountingMode::FirstSeenOnly);
        assert_eq!(settings.retry.max_retries, 0);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(10));
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.google_scopes, vec!["a", "b", "c"]);
        assert_eq!(
            settings.google_refresh_token.unwrap().expose_secret(),
            "1//refresh"
        );
    }

    #[test]
    fn test_empty_owner_is_rejected() {
        assert!(matches!(
            load(&[("OWNER_EMAIL", "  ")]),
            Err(ConfigError::Missing { key: "OWNER_EMAIL" })
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("DEV_CREATE_ALL", "maybe")]),
            Err(ConfigError::Invalid { key: "DEV_CREATE_ALL", .. })
        ));
        assert!(matches!(
            load(&[("PROVIDER_MAX_RETRIES", "-1")]),
            Err(ConfigError::Invalid { key: "PROVIDER_MAX_RETRIES", .. })
        ));
        assert!(matches!(
            load(&[("BIND_ADDR", "localhost")]),
            Err(ConfigError::Invalid { key: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://db/app")]),
            Err(ConfigError::Invalid { key: "DATABASE_URL", .. })
        ));
    }

    #[test]
    fn test_client_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret");
        std::fs::write(&path, "file-secret\n").unwrap();

        let settings = load(&[("GOOGLE_CLIENT_SECRET_FILE", path.to_str().unwrap())]).unwrap();
        assert_eq!(settings.google_client_secret.expose_secret(), "file-secret");
    }

    #[test]
    fn test_parse_database_url() {
        assert_eq!(
            parse_database_url("sqlite+aiosqlite:///./app.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("./app.db"))
        );
        assert_eq!(
            parse_database_url("sqlite:////var/lib/cleaner.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/lib/cleaner.db"))
        );
        assert_eq!(parse_database_url(":memory:").unwrap(), DatabaseLocation::Memory);
        assert_eq!(
            parse_database_url("data/app.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/app.db"))
        );
        assert!(parse_database_url("sqlite:///").is_err());
    }

    #[test]
    fn test_parse_bool() {
        for v in ["true", "TRUE", "1", "yes", "Yes"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "NO"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("on"), None);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("APP_NAME", "Env Cleaner");
        std::env::set_var("PROVIDER_MAX_RETRIES", "4");
        let settings = Settings::from_env();
        std::env::remove_var("APP_NAME");
        std::env::remove_var("PROVIDER_MAX_RETRIES");

        let settings = settings.unwrap();
        assert_eq!(settings.app_name, "Env Cleaner");
        assert_eq!(settings.retry.max_retries, 4);
    }
}
