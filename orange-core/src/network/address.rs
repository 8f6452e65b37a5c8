//! Candidate address handling.

use url::Url;

use crate::error::OrangeError;

/// Default scheme for bare `host:port` candidates.
pub const DEFAULT_SCHEME: &str = "ws://";

/// Turn a user-supplied candidate into the websocket URL the session dials.
///
/// A missing scheme becomes `ws://`. The `token` query parameter is set to
/// `token`, replacing any existing one; other parameters are kept in order.
/// An empty token leaves the query without one.
pub fn normalize(address: &str, token: &str) -> Result<Url, OrangeError> {
    let address = address.trim();
    let mut url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("{DEFAULT_SCHEME}{address}"))?
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() || !token.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        if !token.is_empty() {
            pairs.append_pair("token", token);
        }
    }
    Ok(url)
}

/// The name shown for a server: its host, or the whole address when the
/// URL has none.
pub fn server_name(url: &Url) -> String {
    url.host_str().map_or_else(|| url.to_string(), str::to_owned)
}

/// The HTTP address probed for a websocket candidate.
pub fn probe_url(candidate: &str) -> String {
    let candidate = candidate.trim();
    if let Some(rest) = candidate.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = candidate.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if candidate.contains("://") {
        candidate.to_string()
    } else {
        format!("http://{candidate}")
    }
}

// ── Tests ────────────────────────────────────────────────────────
