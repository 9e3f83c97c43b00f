//! SQLite-backed implementation of the [`super::Storage`] trait.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::models::{Exchange, StatsProjection};
use super::Storage;

/// `sqlx::SqlitePool`-backed store. Each write opens its own transaction and
/// commits (or rolls back on error/drop) before returning.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect to `connection_string` (created if missing) and run embedded
    /// migrations before returning.
    pub async fn connect(connection_string: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(connection_string)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn add(&self, exchange: Exchange) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO exchanges
                (timestamp, method, path, request_headers, request_body,
                 response_status, response_headers, response_body, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(exchange.timestamp)
        .bind(&exchange.method)
        .bind(&exchange.path)
        .bind(&exchange.request_headers)
        .bind(&exchange.request_body)
        .bind(exchange.response_status)
        .bind(&exchange.response_headers)
        .bind(&exchange.response_body)
        .bind(exchange.duration_ms)
        .execute(&mut *tx)
        .await?;

        let exchange_id = result.last_insert_rowid();

        if let Some(usage) = exchange.token_usage {
            sqlx::query(
                r#"
                INSERT INTO token_usage
                    (exchange_id, timestamp, model, input_tokens, output_tokens,
                     cache_read_tokens, cache_creation_tokens)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(exchange_id)
            .bind(usage.timestamp)
            .bind(&usage.model)
            .bind(usage.input_tokens)
            .bind(usage.output_tokens)
            .bind(usage.cache_read_tokens)
            .bind(usage.cache_creation_tokens)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(exchange_id)
    }

    async fn get_stats_projections(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StatsProjection>, sqlx::Error> {
        sqlx::query_as::<_, StatsProjection>(
            r#"
            SELECT
                e.timestamp AS timestamp,
                (t.exchange_id IS NOT NULL) AS has_llm,
                COALESCE(t.input_tokens, 0) AS input_tokens,
                COALESCE(t.output_tokens, 0) AS output_tokens
            FROM exchanges e
            LEFT JOIN token_usage t ON t.exchange_id = e.id
            WHERE e.timestamp >= ? AND e.timestamp < ?
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }
}
