//! `List-Unsubscribe` header extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]*)>").expect("valid bracketed-directive regex"));

/// Marker a `List-Unsubscribe-Post` value carries for RFC 8058 one-click.
const ONE_CLICK_MARKER: &str = "list-unsubscribe=one-click";

/// Structured unsubscribe affordances declared by a message.
///
/// Targets are recorded as found; nothing validates that they are
/// well-formed URLs or mail addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnsubscribeSignal {
    pub has_signal: bool,
    pub http_target: Option<String>,
    pub mailto_target: Option<String>,
    pub one_click: bool,
}

impl UnsubscribeSignal {
    /// A message without any `List-Unsubscribe` header.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a `List-Unsubscribe` value.
    pub fn from_header(list_unsubscribe: Option<&str>) -> Self {
        Self::from_headers(list_unsubscribe, None)
    }

    /// Parses `List-Unsubscribe` together with `List-Unsubscribe-Post`.
    pub fn from_headers(list_unsubscribe: Option<&str>, list_unsubscribe_post: Option<&str>) -> Self {
        let Some(value) = list_unsubscribe.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::none();
        };

        let mut signal = Self {
            has_signal: true,
            ..Self::default()
        };

        for directive in directives(value) {
            let lower = directive.to_ascii_lowercase();
            if signal.http_target.is_none()
                && (lower.starts_with("https://") || lower.starts_with("http://"))
            {
                signal.http_target = Some(directive.to_string());
            } else if signal.mailto_target.is_none() && lower.starts_with("mailto:") {
                signal.mailto_target = Some(directive.to_string());
            }
        }

        signal.one_click = list_unsubscribe_post
            .is_some_and(|post| post.to_ascii_lowercase().contains(ONE_CLICK_MARKER));

        signal
    }
}

/// Splits a header value into its directives: the contents of `<...>`
/// groups, or comma-separated entries when no groups are present.
fn directives(value: &str) -> Vec<&str> {
    let bracketed: Vec<&str> = BRACKETED_RE
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|d| !d.is_empty())
        .collect();

    if !bracketed.is_empty() {
        return bracketed;
    }

    value
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_channels() {
        let signal = UnsubscribeSignal::from_header(Some("<https://x/unsub>, <mailto:y@z.com>"));
        assert!(signal.has_signal);
        assert_eq!(signal.http_target.as_deref(), Some("https://x/unsub"));
        assert_eq!(signal.mailto_target.as_deref(), Some("mailto:y@z.com"));
        assert!(!signal.one_click);
    }

    #[test]
    fn test_absent_header() {
        let signal = UnsubscribeSignal::from_header(None);
        assert!(!signal.has_signal);
        assert!(signal.http_target.is_none());
        assert!(signal.mailto_target.is_none());
        assert_eq!(signal, UnsubscribeSignal::none());
    }

    #[test]
    fn test_blank_header_is_absent() {
        assert!(!UnsubscribeSignal::from_header(Some("  ")).has_signal);
    }

    #[test]
    fn test_mailto_only() {
        let signal = UnsubscribeSignal::from_header(Some("<mailto:leave@list.org?subject=unsub>"));
        assert!(signal.has_signal);
        assert!(signal.http_target.is_none());
        assert_eq!(
            signal.mailto_target.as_deref(),
            Some("mailto:leave@list.org?subject=unsub")
        );
    }

    #[test]
    fn test_first_directive_of_each_kind_wins() {
        let signal = UnsubscribeSignal::from_header(Some(
            "<http://a/1>, <https://b/2>, <MAILTO:c@d>, <mailto:e@f>",
        ));
        assert_eq!(signal.http_target.as_deref(), Some("http://a/1"));
        assert_eq!(signal.mailto_target.as_deref(), Some("MAILTO:c@d"));
    }

    #[test]
    fn test_malformed_value_still_signals() {
        let signal = UnsubscribeSignal::from_header(Some("click here to stop"));
        assert!(signal.has_signal);
        assert!(signal.http_target.is_none());
        assert!(signal.mailto_target.is_none());
    }

    #[test]
    fn test_unbracketed_entries() {
        let signal = UnsubscribeSignal::from_header(Some("https://x/u, mailto:y@z.com"));
        assert_eq!(signal.http_target.as_deref(), Some("https://x/u"));
        assert_eq!(signal.mailto_target.as_deref(), Some("mailto:y@z.com"));
    }

    #[test]
    fn test_one_click_post() {
        let signal = UnsubscribeSignal::from_headers(
            Some("<https://x/unsub>"),
            Some("List-Unsubscribe=One-Click"),
        );
        assert!(signal.one_click);

        // The post header alone carries no signal.
        let signal = UnsubscribeSignal::from_headers(None, Some("List-Unsubscribe=One-Click"));
        assert!(!signal.has_signal);
        assert!(!signal.one_click);
    }
}
