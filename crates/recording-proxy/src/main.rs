//! Recording proxy: a transparent reverse proxy that forwards Claude Code
//! traffic to an Anthropic-compatible upstream, recording each exchange and
//! its token usage to a local SQLite store.

mod config;
mod error;
mod parser;
mod proxy;
mod recorder;
mod server;
mod stats;
mod storage;
mod truncate;

use std::sync::Arc;
use std::time::Duration;

use config::ProxyConfig;
use server::AppState;
use storage::{SqliteStorage, Storage};

fn main() -> anyhow::Result<()> {
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        ProxyConfig::resolve_path(&args)
    };

    let config = match ProxyConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    // Build the tokio runtime first — the OTLP exporter needs a reactor context.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let _tracing_guard = proxy_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            upstream_base = %config.upstream.base_url,
            "starting recording-proxy"
        );

        run(config).await
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    // Redirects and auto-decompression stay off: reqwest is built without
    // the gzip/brotli/deflate features, so compressed upstream bodies pass
    // through to the client byte-exact (§4.1, §4.9).
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_seconds))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let storage = SqliteStorage::connect(&config.storage.connection_string).await?;
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let state = AppState {
        config,
        http_client,
        storage,
    };

    server::run(state).await
}
