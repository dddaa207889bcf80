//! Deterministic cache key construction
//!
//! Two logically identical requests must always serialize to the same key, so
//! parameters are sorted before serialization and JSON bodies are rendered
//! through `serde_json` (whose object maps iterate in sorted key order).

use crate::transport::Method;
use std::fmt::Write;

/// Build a cache key for a logical resource and its parameters.
///
/// Parameter order at the call site does not affect the result.
pub fn resource_key(resource: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort_unstable();

    let mut key = String::with_capacity(resource.len() + params.len() * 16);
    key.push_str(resource);
    for (name, value) in sorted {
        // Unconditional separator keeps "a:b"+"c" distinct from "a"+"b:c"
        let _ = write!(key, ":{name}={value}");
    }
    key
}

/// Build the deduplication/cache key for an outbound request.
///
/// Covers everything that makes two requests interchangeable: method, url,
/// sorted query parameters, and the serialized body.
pub fn request_key(
    method: Method,
    url: &str,
    params: &[(&str, &str)],
    body: Option<&serde_json::Value>,
) -> String {
    let mut key = resource_key(url, params);
    let mut prefix = String::with_capacity(8);
    let _ = write!(prefix, "{}:", method.as_str());
    key.insert_str(0, &prefix);

    if let Some(body) = body {
        // serde_json's default map is ordered, so this is canonical
        let _ = write!(key, ":{body}");
    }
    key
}

/// Minimal glob matching for cache invalidation patterns.
///
/// Supports `*` as "any run of characters". This is the contract of the
/// remote tier's `keys_matching`; the in-memory remote implementation uses it
/// directly.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(pat: &[u8], text: &[u8]) -> bool {
        match pat.first() {
            None => text.is_empty(),
            Some(b'*') => {
                (0..=text.len()).any(|skip| inner(&pat[1..], &text[skip..]))
            }
            Some(&c) => text.first() == Some(&c) && inner(&pat[1..], &text[1..]),
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}
