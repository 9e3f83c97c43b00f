//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::proxy::forward::forward;
use crate::stats::{self, Bucket};
use crate::storage::Storage;

/// Shared application state, handed to every handler via `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub http_client: reqwest::Client,
    pub storage: Arc<dyn Storage>,
}

/// Build and run the HTTP server until a shutdown signal arrives.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/stats/hourly", get(handle_hourly))
        .route("/api/stats/daily", get(handle_daily))
        .fallback(forward)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "recording-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("recording-proxy shut down gracefully");
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `from`/`to` as raw query strings; parsed (and defaulted) in the handlers
/// so a malformed timestamp can produce a precise 400 message (§4.6).
#[derive(Debug, Deserialize)]
struct StatsQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn handle_hourly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    handle_stats(&state, query, stats::hourly).await
}

async fn handle_daily(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    handle_stats(&state, query, stats::daily).await
}

async fn handle_stats(
    state: &AppState,
    query: StatsQuery,
    aggregate: impl Fn(&[crate::storage::StatsProjection]) -> Vec<Bucket>,
) -> Response {
    let (from, to) = match parse_range(&query) {
        Ok(range) => range,
        Err(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
    };

    match state.storage.get_stats_projections(from, to).await {
        Ok(projections) => Json(aggregate(&projections)).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read stats projections");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

fn parse_range(query: &StatsQuery) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let to = match &query.to {
        Some(raw) => parse_rfc3339(raw)?,
        None => Utc::now(),
    };
    let from = match &query.from {
        Some(raw) => parse_rfc3339(raw)?,
        None => to - Duration::days(7),
    };
    Ok((from, to))
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid RFC 3339 timestamp: {raw}"))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_a_trailing_seven_day_window() {
        let query = StatsQuery { from: None, to: None };
        let (from, to) = parse_range(&query).unwrap();
        assert_eq!((to - from).num_days(), 7);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        let query = StatsQuery {
            from: Some("not-a-date".to_string()),
            to: None,
        };
        assert!(parse_range(&query).is_err());
    }

    #[test]
    fn accepts_explicit_rfc3339_bounds() {
        let query = StatsQuery {
            from: Some("2026-01-01T00:00:00Z".to_string()),
            to: Some("2026-01-02T00:00:00Z".to_string()),
        };
        let (from, to) = parse_range(&query).unwrap();
        assert_eq!(from.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2026-01-02T00:00:00+00:00");
    }
}
