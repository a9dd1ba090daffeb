// src/dedupe.rs
//! URL canonicalization for deduplication.
//!
//! `normalize_url` is pure, deterministic, and idempotent:
//! `normalize_url(normalize_url(u)) == normalize_url(u)`. The normalized
//! form is the global uniqueness key for ingested items.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use url::Url;

/// Tracking query parameters that never survive normalization.
static TRACKING_PARAMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "ref",
        "fbclid",
    ]
    .into_iter()
    .collect()
});

/// Canonicalize a URL for dedup comparison.
///
/// Drops deny-listed tracking parameters, keeps the remaining query
/// parameters in first-seen order (first value per repeated key), rebuilds
/// `scheme://host[:port]/path[?query][#fragment]`, and lower-cases the
/// whole string. Input that does not parse as a URL degrades to a trimmed,
/// lower-cased passthrough so a malformed feed link never aborts ingestion.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_lowercase(),
    };

    let mut out = String::new();
    out.push_str(parsed.scheme());
    out.push_str("://");
    if let Some(host) = parsed.host_str() {
        out.push_str(host);
    }
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(parsed.path());

    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut query_parts: Vec<String> = Vec::new();
    for (k, v) in parsed.query_pairs() {
        if TRACKING_PARAMS.contains(k.as_ref()) {
            continue;
        }
        // First value per key wins; later repeats are dropped.
        if !seen_keys.insert(k.to_string()) {
            continue;
        }
        query_parts.push(format!("{k}={v}"));
    }
    if !query_parts.is_empty() {
        out.push('?');
        out.push_str(&query_parts.join("&"));
    }

    if let Some(fragment) = parsed.fragment() {
        out.push('#');
        out.push_str(fragment);
    }

    out.trim().to_lowercase()
}

/// Deduplicate a list of URLs by normalized form, preserving first-seen
/// order. The returned entries are the original (un-normalized) strings.
pub fn dedupe_urls<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();
    for url in urls {
        let normalized = normalize_url(url.as_ref());
        if seen.insert(normalized) {
            unique.push(url.as_ref().to_string());
        }
    }
    unique
}
