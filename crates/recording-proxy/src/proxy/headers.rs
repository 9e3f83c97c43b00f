//! Hop-by-hop header exclusion sets and the header-capture encoding used for
//! recording (§3, §4.1, §9 of the design notes).
//!
//! Two distinct exclusion sets exist because `Host` is stripped only on the
//! request side (the outgoing client sets it to the upstream authority) and
//! `Content-Length` is stripped on both but recomputed for different reasons
//! on each side.

use std::collections::BTreeMap;

use http::HeaderMap;
use serde_json::Value;

/// Headers that must not be forwarded to the upstream.
pub const REQUEST_HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
    "host",
    "content-length",
];

/// Headers that must not be forwarded back to the client.
pub const RESPONSE_HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
    "content-length",
];

pub fn is_hop_by_hop(name: &str, set: &[&str]) -> bool {
    set.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Serialize a header multimap to the recording encoding: a JSON object
/// mapping each distinct header name (in first-seen order) to its values
/// joined by `", "`. Lossy for duplicate-name headers by design (§9) — this
/// encoding is for observability only, never for wire forwarding.
pub fn encode_headers(headers: &HeaderMap) -> String {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers.iter() {
        let key = name.as_str().to_string();
        let val = value.to_str().unwrap_or("").to_string();
        grouped.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Vec::new()
        });
        grouped.get_mut(&key).unwrap().push(val);
    }

    let mut obj = serde_json::Map::new();
    for key in order {
        let joined = grouped.get(&key).map(|v| v.join(", ")).unwrap_or_default();
        obj.insert(key, Value::String(joined));
    }

    serde_json::to_string(&Value::Object(obj)).unwrap_or_default()
}

/// Look up a header value in an `encode_headers`-produced JSON blob,
/// case-insensitively. Used by the recorder, which only has the recorded
/// text, not the live `HeaderMap`.
pub fn lookup_encoded(encoded: &str, name: &str) -> Option<String> {
    let value: Value = serde_json::from_str(encoded).ok()?;
    let obj = value.as_object()?;
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
        .map(String::from)
}
