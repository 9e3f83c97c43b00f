//! Append-only persistence of Exchanges plus optional TokenUsage children.
//!
//! Service code depends on the narrow [`Storage`] trait, never on `sqlx`
//! types directly — the SQLite implementation is the only thing that knows
//! about pools, transactions, or schema.

pub mod models;
pub mod sqlite;

pub use models::{Exchange, StatsProjection, TokenUsage};
pub use sqlite::SqliteStorage;

use chrono::{DateTime, Utc};

/// Append-only log of Exchanges plus optional TokenUsage children, and a
/// range-projection read for the aggregator.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Insert the Exchange and, if attached, its TokenUsage, atomically.
    /// Returns the new Exchange id.
    async fn add(&self, exchange: Exchange) -> Result<i64, sqlx::Error>;

    /// Every Exchange with `from <= timestamp < to`, projected for aggregation.
    /// Ordering is unspecified.
    async fn get_stats_projections(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StatsProjection>, sqlx::Error>;
}
