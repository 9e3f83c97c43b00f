//! Error taxonomy for the forwarder/storage boundary.
//!
//! The recorder's own failures never reach here — they are logged and
//! swallowed at the point of occurrence (see `recorder.rs`). This enum only
//! covers failures that can still shape the client-facing response.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream did not respond in time")]
    UpstreamTimeout,

    #[error("could not connect to upstream: {0}")]
    UpstreamTransport(String),

    #[error("storage error: {0}")]
    Persist(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::UpstreamTimeout => {
                tracing::warn!("upstream did not respond in time");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Gateway Timeout: upstream did not respond in time.",
                )
                    .into_response()
            }
            ProxyError::UpstreamTransport(ref msg) => {
                tracing::error!(error = %msg, "could not connect to upstream");
                (
                    StatusCode::BAD_GATEWAY,
                    "Bad Gateway: could not connect to upstream.",
                )
                    .into_response()
            }
            ProxyError::Persist(e) => {
                tracing::warn!(error = %e, "storage error surfaced past the recorder");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("internal error"))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
            ProxyError::Config(msg) => {
                tracing::error!(error = %msg, "configuration error");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("internal error"))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}
