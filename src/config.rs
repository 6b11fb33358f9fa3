use std::time::Duration;

use clap::ValueEnum;

use crate::request_id::strip_scheme;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_METRICS_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Transport `(prefill, decode)` addresses used in p2p mode when none are configured.
pub const DEFAULT_TRANSPORTS: (&str, &str) = ("vllm-prefill-same:14579", "vllm-decode-same:14579");

/// How the caller receives the decode response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliveryMode {
    /// Read the whole body, then reply with it and its content type.
    Buffered,
    /// Pass the body through in chunks as it arrives.
    Streaming,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Buffered => "buffered",
            DeliveryMode::Streaming => "streaming",
        }
    }
}

/// Which addresses go into the correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// The HTTP URLs themselves, scheme stripped. Used with a shared filesystem cache.
    Http,
    /// Separate point-to-point transport endpoints, never used for HTTP dispatch.
    Transport { prefill: String, decode: String },
}

/// Deployment presets matching the two cache transfer setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProxyMode {
    /// KV cache handed off through a shared filesystem.
    Fs,
    /// KV cache sent directly between engines.
    P2p,
}

impl ProxyMode {
    /// HTTP base URLs `(prefill, decode)` used when none are configured.
    pub fn default_urls(self) -> (&'static str, &'static str) {
        match self {
            ProxyMode::Fs => ("http://vllm-prefill-fs:8000", "http://vllm-decode-fs:8000"),
            ProxyMode::P2p => (
                "http://vllm-prefill-same:8000",
                "http://vllm-decode-same:8000",
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub prefill_url: String,
    pub decode_url: String,
    pub addressing: Addressing,
    pub delivery: DeliveryMode,
    pub request_timeout: Duration,
    pub metrics_timeout: Duration,
    pub max_payload_size: usize,
}

impl ProxyConfig {
    pub fn fs_kv(prefill_url: impl Into<String>, decode_url: impl Into<String>) -> Self {
        Self::with_defaults(
            prefill_url.into(),
            decode_url.into(),
            Addressing::Http,
            DeliveryMode::Streaming,
        )
    }

    pub fn p2p(
        prefill_url: impl Into<String>,
        decode_url: impl Into<String>,
        prefill_transport: impl Into<String>,
        decode_transport: impl Into<String>,
    ) -> Self {
        Self::with_defaults(
            prefill_url.into(),
            decode_url.into(),
            Addressing::Transport {
                prefill: prefill_transport.into(),
                decode: decode_transport.into(),
            },
            DeliveryMode::Buffered,
        )
    }

    fn with_defaults(
        prefill_url: String,
        decode_url: String,
        addressing: Addressing,
        delivery: DeliveryMode,
    ) -> Self {
        ProxyConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            prefill_url: prefill_url.trim_end_matches('/').to_string(),
            decode_url: decode_url.trim_end_matches('/').to_string(),
            addressing,
            delivery,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics_timeout: DEFAULT_METRICS_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("prefill", &self.prefill_url), ("decode", &self.decode_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{} url must use http:// or https://: {:?}", name, url);
            }
            if strip_scheme(url).is_empty() {
                anyhow::bail!("{} url has no host", name);
            }
        }
        if let Addressing::Transport { prefill, decode } = &self.addressing {
            if prefill.trim().is_empty() || decode.trim().is_empty() {
                anyhow::bail!("p2p mode requires both prefill and decode transport addresses");
            }
        }
        if self.request_timeout.is_zero() || self.metrics_timeout.is_zero() {
            anyhow::bail!("timeouts must be greater than zero");
        }
        if self.max_payload_size == 0 {
            anyhow::bail!("max payload size must be greater than zero");
        }
        Ok(())
    }

    /// The `(prefill, decode)` pair embedded in correlation identifiers.
    pub fn identifier_addresses(&self) -> (&str, &str) {
        match &self.addressing {
            Addressing::Http => (
                strip_scheme(&self.prefill_url),
                strip_scheme(&self.decode_url),
            ),
            Addressing::Transport { prefill, decode } => (prefill.as_str(), decode.as_str()),
        }
    }

    pub fn prefill_endpoint(&self, api_path: &str) -> String {
        join_path(&self.prefill_url, api_path)
    }

    pub fn decode_endpoint(&self, api_path: &str) -> String {
        join_path(&self.decode_url, api_path)
    }

    /// Only the point-to-point deployment exposes backend metrics.
    pub fn metrics_enabled(&self) -> bool {
        matches!(self.addressing, Addressing::Transport { .. })
    }

    pub fn mode_name(&self) -> &'static str {
        match self.addressing {
            Addressing::Http => "fs-kv",
            Addressing::Transport { .. } => "p2p-nccl",
        }
    }
}

fn join_path(base: &str, api_path: &str) -> String {
    if api_path.starts_with('/') {
        format!("{}{}", base, api_path)
    } else {
        format!("{}/{}", base, api_path)
    }
}
