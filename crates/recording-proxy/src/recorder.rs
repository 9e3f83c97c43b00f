//! The recorder (C3): attaches TokenUsage to LLM-call Exchanges and persists
//! the result via [`Storage`], off the response path.
//!
//! `record` is the fire-and-forget entry point the forwarder calls; the
//! actual work lives in [`record_core`] so it can be driven directly in
//! tests without a runtime spawn.

use std::sync::Arc;

use tracing::Instrument;

use crate::parser;
use crate::proxy::headers;
use crate::storage::{Exchange, Storage, TokenUsage};

/// Spawn a background task that persists `exchange`, logging and swallowing
/// any failure (§4.3 step 3).
pub fn record(storage: Arc<dyn Storage>, exchange: Exchange) {
    let span = proxy_tracing::recorder_span!(exchange.path);
    tokio::spawn(
        async move {
            let method = exchange.method.clone();
            let path = exchange.path.clone();
            match record_core(storage.as_ref(), exchange).await {
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(method = %method, path = %path, error = %err, "failed to persist exchange");
                }
            }
        }
        .instrument(span),
    );
}

/// Attach TokenUsage when applicable, then insert atomically via `storage`.
pub async fn record_core(storage: &dyn Storage, mut exchange: Exchange) -> Result<i64, sqlx::Error> {
    attach_token_usage(&mut exchange);
    tracing::Span::current().record("has_token_usage", exchange.token_usage.is_some());
    storage.add(exchange).await
}

fn attach_token_usage(exchange: &mut Exchange) {
    if !parser::is_anthropic_messages_call(&exchange.method, &exchange.path) {
        return;
    }

    let is_streaming = headers::lookup_encoded(&exchange.response_headers, "content-type")
        .map(|ct| parser::is_streaming_content_type(&ct))
        .unwrap_or(false);

    let parsed = exchange
        .response_body
        .as_deref()
        .and_then(|body| parser::parse(body, is_streaming));

    match parsed {
        Some(usage) => {
            exchange.token_usage = Some(TokenUsage {
                id: None,
                exchange_id: None,
                timestamp: exchange.timestamp,
                model: usage.model,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cache_read_tokens: usage.cache_read_tokens,
                cache_creation_tokens: usage.cache_creation_tokens,
            });
        }
        None => {
            tracing::warn!(
                method = %exchange.method,
                path = %exchange.path,
                "classified as an LLM call but token usage parse failed"
            );
        }
    }
}
