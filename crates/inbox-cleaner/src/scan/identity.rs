//! Sender identity normalization.

use std::sync::LazyLock;

use regex::Regex;

static ANGLE_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]*)>").expect("valid angle-address regex"));

/// Canonicalizes a raw `From` header value into a sender identity key.
///
/// Takes the address inside the last `<...>` group, or the last
/// whitespace-delimited token when there are no angle brackets. The result
/// is lower-cased and plus-addressing is collapsed (`jane+promo@x` becomes
/// `jane@x`). Empty or absent input yields `""`, the "unknown sender" key.
pub fn normalize_sender(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return String::new();
    };

    let address = match ANGLE_ADDR_RE
        .captures_iter(raw)
        .last()
        .and_then(|caps| caps.get(1))
    {
        Some(inner) => inner.as_str().trim(),
        None => raw.split_whitespace().last().unwrap_or_default(),
    };

    let address = address.to_lowercase();
    match address.rsplit_once('@') {
        Some((local, domain)) => {
            let local = local.split('+').next().unwrap_or_default();
            format!("{}@{}", local, domain)
        }
        None => address,
    }
}
