//! Span builder helpers for recording-proxy instrumentation.

/// Create a tracing span for a single proxied-and-recorded exchange.
///
/// Usage: `let span = exchange_span!(correlation_id, method, path); async { .. }.instrument(span).await`
///
/// Fields recorded later as the pipeline progresses:
/// - `status`: upstream response status (or 502/504 on failure)
/// - `latency_ms`: total duration from request arrival to response completion
/// - `recorded`: whether an Exchange row was written
#[macro_export]
macro_rules! exchange_span {
    ($correlation_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_exchange",
            correlation_id = %$correlation_id,
            method = %$method,
            path = %$path,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            recorded = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the recorder's background write.
#[macro_export]
macro_rules! recorder_span {
    ($exchange_id_hint:expr) => {
        tracing::info_span!(
            "recorder_write",
            path = %$exchange_id_hint,
            has_token_usage = tracing::field::Empty,
        )
    };
}
