//! Persisted and ephemeral data model: Exchange, TokenUsage, StatsProjection.

use chrono::{DateTime, Utc};

/// A single recorded (request, response) pair plus timing.
///
/// `id` is `None` until the row has been inserted by [`super::Storage::add`].
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub request_headers: String,
    pub request_body: Option<String>,
    pub response_status: i32,
    pub response_headers: String,
    pub response_body: Option<String>,
    pub duration_ms: i64,
    pub token_usage: Option<TokenUsage>,
}

/// Per-call token counts reported by the upstream, at most one per Exchange.
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub id: Option<i64>,
    pub exchange_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
}

/// The narrow read projection the aggregator needs, as returned by
/// [`super::Storage::get_stats_projections`]. Ordering is unspecified; callers
/// must sort by `timestamp` themselves.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsProjection {
    pub timestamp: DateTime<Utc>,
    pub has_llm: bool,
    pub input_tokens: i64,
    pub output_tokens: i64,
}
