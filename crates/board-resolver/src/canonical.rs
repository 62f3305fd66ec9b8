//! URL canonicalization.
//!
//! Every comparison, cache key and dedup decision in the crate goes through
//! [`canonicalize`], so two URLs name the same resource iff their canonical
//! forms are equal.

use url::Url;

/// Query keys starting with one of these (case-insensitive) are dropped.
const TRACKING_PREFIXES: [&str; 5] = ["utm_", "fbclid", "gclid", "mc_", "mkt_"];

/// Normalize `raw` into its canonical form.
///
/// Returns an empty string for empty or unparseable input. Schemes other than
/// http/https are passed through; rejecting them is the caller's job.
pub fn canonicalize(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let Some(mut url) = parse_lenient(raw) else {
        return String::new();
    };

    url.set_fragment(None);
    if !url.cannot_be_a_base() {
        let path = collapse_path(url.path());
        url.set_path(&path);
    }
    strip_tracking(&mut url);
    url.to_string()
}

/// Absolute http(s) URL with a non-empty host.
pub fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => {
            matches!(u.scheme(), "http" | "https")
                && u.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Lower-cased host of `url`, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
}

fn parse_lenient(raw: &str) -> Option<Url> {
    let candidate = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };

    match Url::parse(&candidate) {
        // "localhost:8080/jobs" parses as scheme "localhost"; treat it as host:port.
        Ok(u) if u.cannot_be_a_base() && u.path().starts_with(|c: char| c.is_ascii_digit()) => {
            Url::parse(&format!("https://{candidate}")).ok()
        }
        Ok(u) => Some(u),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{candidate}")).ok()
        }
        Err(_) => None,
    }
}

fn collapse_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn is_tracking_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn strip_tracking(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}
