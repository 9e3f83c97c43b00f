//! The body-size cap + trailer mechanism applied to recorded bodies (§3).
//!
//! Wire bytes delivered to the client are never touched by this — it only
//! shapes what gets written to the store.

/// Truncate `body` to at most `cap` UTF-8 bytes, appending a trailer noting
/// the original and stored sizes when truncation occurred. The prefix is
/// always the longest valid UTF-8 string whose byte length is `<= cap`.
pub fn truncate_body(body: &str, cap: usize) -> String {
    let original_len = body.len();
    if original_len <= cap {
        return body.to_string();
    }

    let mut end = cap;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    let prefix = &body[..end];

    format!("{prefix}\n[TRUNCATED: original size was {original_len} bytes, stored first {end} bytes]")
}
