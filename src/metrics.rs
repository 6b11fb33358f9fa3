use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};

use crate::backend::{BackendClient, BufferedResponse};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};

pub const DEFAULT_METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Clone)]
pub struct ScrapedMetrics {
    pub body: Bytes,
    pub content_type: String,
    /// Base URL of the backend that answered.
    pub source: String,
}

/// Relays one backend's Prometheus metrics so an external scorer has a single
/// scrape target per proxy. Decode is tried first, then prefill.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    client: BackendClient,
    targets: Vec<String>,
    timeout: Duration,
}

impl MetricsAggregator {
    pub fn new(client: BackendClient, config: &ProxyConfig) -> Self {
        Self {
            client,
            targets: vec![config.decode_url.clone(), config.prefill_url.clone()],
            timeout: config.metrics_timeout,
        }
    }

    pub async fn aggregate(&self) -> ProxyResult<ScrapedMetrics> {
        let mut last_error = String::from("no metrics targets configured");
        for base_url in &self.targets {
            let url = format!("{}/metrics", base_url);
            match self
                .client
                .fetch(&url, self.timeout, DEFAULT_METRICS_CONTENT_TYPE)
                .await
            {
                Ok(BufferedResponse { body, content_type }) => {
                    debug!("Scraped {} bytes of metrics from {}", body.len(), url);
                    return Ok(ScrapedMetrics {
                        body,
                        content_type,
                        source: base_url.clone(),
                    });
                }
                Err(e) => {
                    warn!("Metrics request to {} failed: {}", url, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(ProxyError::AllMetricsProbesFailed(last_error))
    }
}
