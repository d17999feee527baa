//! URL normalization used to decide whether two locations name the same document.

use url::Url;

use crate::error::{EngineError, EngineErrorKind};

/// Parse `raw` into a URL. Scheme and host come back lowercased.
pub fn normalize_url(raw: &str) -> Result<Url, EngineError> {
    Url::parse(raw.trim()).map_err(|err| {
        EngineError::new(EngineErrorKind::InvalidUrl).with_hint(format!("{raw}: {err}"))
    })
}

/// Comparison key ignoring a trailing slash and the fragment.
pub fn location_key(url: &Url) -> String {
    let mut key = format!("{}:", url.scheme());
    if url.has_host() {
        key.push_str("//");
        key.push_str(url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            key.push(':');
            key.push_str(&port.to_string());
        }
    }
    key.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// True when both strings parse and name the same location.
pub fn same_location(a: &str, b: &str) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Ok(a), Ok(b)) => location_key(&a) == location_key(&b),
        _ => a.trim() == b.trim(),
    }
}
