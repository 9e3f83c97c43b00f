//! Configuration types and loading logic (§4.7).
//!
//! Layered: environment variables (`PROXY_` prefix, `__` nesting) take
//! priority over a TOML file, which takes priority over field defaults.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use proxy_tracing::TracingConfig;
use serde::Deserialize;

/// Top-level proxy configuration, read once at startup and immutable after.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

/// The upstream the proxy forwards to. `base_url` has no default: it is a
/// required field whose absence aborts the process (§4.7).
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_stored_body_bytes")]
    pub max_stored_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:3080".to_string()
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_stored_body_bytes() -> usize {
    1_048_576
}

fn default_connection_string() -> String {
    "sqlite://proxy.db".to_string()
}

impl ProxyConfig {
    /// Load configuration from `config_path` (TOML) merged under environment
    /// overrides, then validate. Returns `Err` when `upstream.base_url` is
    /// missing or empty — the caller exits the process non-zero on that
    /// error (§4.7, §6), never panicking here.
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("PROXY_").split("__"))
            .extract()?;

        config.upstream.base_url = config.upstream.base_url.trim_end_matches('/').to_string();

        if config.upstream.base_url.is_empty() {
            anyhow::bail!("upstream.base_url is required and must not be empty");
        }

        Ok(config)
    }

    /// Resolve the config file path: `--config <path>` flag, else
    /// `PROXY_CONFIG` env var, else `proxy.toml` (§4.7).
    pub fn resolve_path(args: &[String]) -> String {
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            .or_else(|| std::env::var("PROXY_CONFIG").ok())
            .unwrap_or_else(|| "proxy.toml".to_string())
    }

    #[cfg(test)]
    pub fn for_test(base_url: String) -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                base_url,
                timeout_seconds: default_timeout_seconds(),
                max_stored_body_bytes: default_max_stored_body_bytes(),
            },
            storage: StorageConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}
