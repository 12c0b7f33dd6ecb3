use std::collections::HashMap;
use std::sync::Arc;

use inbox_cleaner::config::Settings;
use inbox_cleaner::provider::{
    AccessTokenSource, MailProvider, MessageMetadata, MessagePage, RetryConfig,
};
use inbox_cleaner::scan::{AggregateStore, CountingMode, InboxScanner};
use inbox_cleaner::{AppState, Database};

use super::scripted::{ScriptedProvider, StaticTokenSource};

/// Builds a page of ids with an optional continuation token.
pub fn page(ids: &[&str], next: Option<&str>) -> MessagePage {
    MessagePage {
        ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: next.map(String::from),
    }
}

/// Builds `count` ids named `{prefix}{n}`.
pub fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|n| format!("{}{}", prefix, n)).collect()
}

/// Builds metadata for `id` with the given headers (names as sent).
pub fn meta(id: &str, headers: &[(&str, &str)]) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

/// Metadata with only a `From` header.
pub fn from(id: &str, sender: &str) -> MessageMetadata {
    meta(id, &[("From", sender)])
}

/// Scripts the five-message inbox used by most tests:
/// pages `[m1, m2]`, `[m3, m4]`, `[m5]`.
pub fn five_message_inbox() -> Arc<ScriptedProvider> {
    let provider = Arc::new(ScriptedProvider::new());
    provider
        .push_page(page(&["m1", "m2"], Some("p2")))
        .push_page(page(&["m3", "m4"], Some("p3")))
        .push_page(page(&["m5"], None));
    provider
        .add_metadata(from("m1", "Jane <jane+promo@example.com>"))
        .add_metadata(from("m2", "JANE@EXAMPLE.COM"))
        .add_metadata(from("m3", "bob@shop.com"))
        .add_metadata(from("m4", "Bob <bob@shop.com>"))
        .add_metadata(from("m5", "news@list.org"));
    provider
}

pub fn test_store(counting: CountingMode) -> AggregateStore {
    AggregateStore::new(
        Database::open_in_memory().expect("in-memory database"),
        counting,
    )
}

/// Retries without waiting.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: std::time::Duration::ZERO,
    }
}

pub fn scanner(provider: &Arc<ScriptedProvider>, store: &AggregateStore) -> InboxScanner {
    let provider: Arc<dyn MailProvider> = provider.clone();
    InboxScanner::new(provider, store.clone()).with_retry(fast_retry(0))
}

/// Settings with defaults and no provider retries.
pub fn test_settings() -> Settings {
    Settings::from_lookup(|key| match key {
        "PROVIDER_MAX_RETRIES" => Some("0".to_string()),
        "DATABASE_URL" => Some(":memory:".to_string()),
        _ => None,
    })
    .expect("default settings")
}

/// App state over a fresh database and the given provider.
pub fn app_state(provider: &Arc<ScriptedProvider>, authenticated: bool) -> AppState {
    let tokens: Arc<dyn AccessTokenSource> = if authenticated {
        Arc::new(StaticTokenSource::authenticated())
    } else {
        Arc::new(StaticTokenSource::unauthenticated())
    };
    let provider: Arc<dyn MailProvider> = provider.clone();
    let db = Database::open_in_memory().expect("in-memory database");
    AppState::new(&test_settings(), db, provider, tokens)
}
