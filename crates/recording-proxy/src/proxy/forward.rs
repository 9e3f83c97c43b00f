//! The proxy forwarder (C4): the terminal handler for every request not
//! claimed by the analytics API (§4.1). Buffers the request, replays it
//! against the upstream, copies status and headers back, and streams or
//! buffers the body while capturing what the recorder needs.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tracing::Instrument;

use crate::error::ProxyError;
use crate::parser;
use crate::proxy::correlation;
use crate::proxy::headers::{encode_headers, is_hop_by_hop, REQUEST_HOP_BY_HOP, RESPONSE_HOP_BY_HOP};
use crate::proxy::tee::RecordingStream;
use crate::recorder;
use crate::server::AppState;
use crate::storage::Exchange;
use crate::truncate::truncate_body;

/// Axum handler mounted as the fallback route.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation::generate_id();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let span = proxy_tracing::exchange_span!(correlation_id, method, path);
    let path_for_run = path.clone();
    let method_for_run = method.clone();

    async move {
        match run(&state, method_for_run, path_for_run, headers, body).await {
            Ok(response) => {
                tracing::Span::current().record("recorded", true);
                response
            }
            Err(err) => {
                let response = err.into_response();
                tracing::Span::current().record("recorded", false);
                tracing::Span::current().record("status", response.status().as_u16());
                response
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(
    state: &AppState,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let arrival = Utc::now();
    let start = Instant::now();

    let request_headers_encoded = encode_headers(&headers);
    let request_body_text = (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned());

    let base = state.config.upstream.base_url.trim_end_matches('/');
    let url = format!("{base}{path}");

    let mut req_builder = state.http_client.request(method.clone(), &url);
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str(), REQUEST_HOP_BY_HOP) {
            continue;
        }
        req_builder = req_builder.header(name, value);
    }
    if !body.is_empty() {
        req_builder = req_builder.body(body);
    }

    let upstream = req_builder.send().await.map_err(|e| {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout
        } else {
            ProxyError::UpstreamTransport(e.to_string())
        }
    })?;

    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let response_headers_encoded = encode_headers(&response_headers);

    let content_type = response_headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_streaming = parser::is_streaming_content_type(content_type);

    let content_encoding = response_headers
        .get(axum::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in response_headers.iter() {
        if is_hop_by_hop(name.as_str(), RESPONSE_HOP_BY_HOP) {
            continue;
        }
        builder = builder.header(name, value);
    }

    let storage = state.storage.clone();
    let cap = state.config.upstream.max_stored_body_bytes;
    let response_status = status.as_u16() as i32;
    let span = tracing::Span::current();

    let tee_span = span.clone();
    let on_complete = move |raw: Vec<u8>| {
        let duration_ms = start.elapsed().as_millis() as i64;
        tee_span.record("status", status.as_u16());
        tee_span.record("latency_ms", duration_ms);
        let response_body = decode_response_body(&raw, &content_encoding);
        let exchange = build_exchange(
            arrival,
            method.to_string(),
            path,
            request_headers_encoded,
            request_body_text,
            response_status,
            response_headers_encoded,
            response_body,
            duration_ms,
            cap,
        );
        recorder::record(storage, exchange);
    };

    // Both branches defer `recorder::record` to `RecordingStream`'s
    // clean-exhaustion callback (proxy/tee.rs) so a client disconnect mid-body
    // — buffered or streaming — leaves no Exchange recorded (§4.1, §5). The
    // buffered branch reads the whole upstream body up front but still only
    // hands it to the client through the same tee, one chunk.
    let body = if is_streaming {
        Body::from_stream(RecordingStream::new(upstream.bytes_stream(), on_complete))
    } else {
        let raw = upstream
            .bytes()
            .await
            .map_err(|e| ProxyError::UpstreamTransport(e.to_string()))?;
        let single_chunk =
            futures_util::stream::once(futures_util::future::ready(Ok::<Bytes, reqwest::Error>(raw)));
        Body::from_stream(RecordingStream::new(single_chunk, on_complete))
    };

    let response = builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    Ok(response)
}

/// Decode a response accumulator to UTF-8 text for recording, undoing gzip
/// when `content_encoding` names it. Never touches the bytes sent to the
/// client — this is recording-side only (§4.1 step 6).
fn decode_response_body(raw: &[u8], content_encoding: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if content_encoding.contains("gzip") {
        let mut decoder = flate2::read::GzDecoder::new(raw);
        let mut decoded = Vec::new();
        if decoder.read_to_end(&mut decoded).is_ok() {
            return Some(String::from_utf8_lossy(&decoded).into_owned());
        }
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}

#[allow(clippy::too_many_arguments)]
fn build_exchange(
    timestamp: DateTime<Utc>,
    method: String,
    path: String,
    request_headers: String,
    request_body: Option<String>,
    response_status: i32,
    response_headers: String,
    response_body: Option<String>,
    duration_ms: i64,
    cap: usize,
) -> Exchange {
    Exchange {
        id: None,
        timestamp,
        method,
        path,
        request_headers,
        request_body: request_body.map(|b| truncate_body(&b, cap)),
        response_status,
        response_headers,
        response_body: response_body.map(|b| truncate_body(&b, cap)),
        duration_ms,
        token_usage: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::storage::{Exchange as StoredExchange, Storage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path as path_matcher};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CapturingStore {
        added: Mutex<Vec<StoredExchange>>,
    }

    #[async_trait]
    impl Storage for CapturingStore {
        async fn add(&self, exchange: StoredExchange) -> Result<i64, sqlx::Error> {
            self.added.lock().unwrap().push(exchange);
            Ok(1)
        }

        async fn get_stats_projections(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<crate::storage::StatsProjection>, sqlx::Error> {
            Ok(Vec::new())
        }
    }

    fn test_state(base_url: String, store: Arc<dyn Storage>) -> AppState {
        AppState {
            config: ProxyConfig::for_test(base_url),
            http_client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("client builds"),
            storage: store,
        }
    }

    #[tokio::test]
    async fn non_streaming_call_is_forwarded_and_recorded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_matcher("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(
                        r#"{"type":"message","model":"claude-sonnet-4-6","usage":{"input_tokens":10,"output_tokens":25,"cache_read_input_tokens":100,"cache_creation_input_tokens":50}}"#,
                    ),
            )
            .mount(&mock_server)
            .await;

        let store = Arc::new(CapturingStore::default());
        let state = test_state(mock_server.uri(), store.clone());

        let response = run(
            &state,
            Method::POST,
            "/v1/messages".to_string(),
            HeaderMap::new(),
            Bytes::from_static(br#"{"model":"claude-x"}"#),
        )
        .await
        .expect("forward succeeds");

        assert_eq!(response.status(), StatusCode::OK);

        // Let the fire-and-forget recorder task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let added = store.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        let usage = added[0].token_usage.as_ref().expect("usage present");
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 25);
    }

    #[tokio::test]
    async fn upstream_refusal_maps_to_bad_gateway_and_records_nothing() {
        let store = Arc::new(CapturingStore::default());
        // Nothing is listening on this port.
        let state = test_state("http://127.0.0.1:1".to_string(), store.clone());

        let err = run(
            &state,
            Method::GET,
            "/health".to_string(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .expect_err("connection should be refused");

        match err {
            ProxyError::UpstreamTransport(_) => {}
            other => panic!("expected UpstreamTransport, got {other:?}"),
        }
        assert!(store.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncation_rule_caps_stored_body_without_touching_the_wire() {
        let mock_server = MockServer::start().await;
        let big_body = "X".repeat(200);
        Mock::given(method("GET"))
            .and(path_matcher("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string(big_body.clone()))
            .mount(&mock_server)
            .await;

        let store = Arc::new(CapturingStore::default());
        let mut config = ProxyConfig::for_test(mock_server.uri());
        config.upstream.max_stored_body_bytes = 50;
        let state = AppState {
            config,
            http_client: reqwest::Client::builder().no_proxy().build().unwrap(),
            storage: store.clone(),
        };

        let response = run(
            &state,
            Method::GET,
            "/big".to_string(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await
        .expect("forward succeeds");

        let wire_body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert_eq!(wire_body.len(), 200);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let added = store.added.lock().unwrap();
        let recorded = added[0].response_body.as_ref().unwrap();
        assert!(recorded.starts_with(&"X".repeat(50)));
        assert!(recorded.contains("[TRUNCATED:"));
    }
}
