use std::sync::Arc;

use actix_web::HttpResponse;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;

use crate::backend::{BackendClient, ChunkStream};
use crate::config::{Addressing, ProxyConfig};
use crate::error::ProxyResult;
use crate::io_struct::GenerationRequest;
use crate::metrics::{MetricsAggregator, ScrapedMetrics};
use crate::router::TwoPhaseRouter;

pub enum ProxyResponseBody {
    Full(Bytes),
    Stream(ChunkStream),
}

/// The decode backend's answer, ready to hand back to the caller.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: ProxyResponseBody,
}

impl ProxyResponse {
    pub fn to_json(&self) -> anyhow::Result<serde_json::Value> {
        match &self.body {
            ProxyResponseBody::Full(body) => Ok(serde_json::from_slice(body)?),
            ProxyResponseBody::Stream(_) => anyhow::bail!("Stream response is not supported"),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.body, ProxyResponseBody::Stream(_))
    }
}

impl From<ProxyResponse> for HttpResponse {
    fn from(response: ProxyResponse) -> Self {
        let status = actix_web::http::StatusCode::from_u16(response.status.as_u16())
            .unwrap_or(actix_web::http::StatusCode::OK);
        let mut builder = HttpResponse::build(status);
        builder.content_type(response.content_type);
        match response.body {
            ProxyResponseBody::Full(body) => builder.body(body),
            ProxyResponseBody::Stream(stream) => builder.streaming(stream),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub mode: &'static str,
    pub prefill: String,
    pub decode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefill_transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_transport: Option<String>,
    pub delivery: &'static str,
}

/// Everything a request handler needs. Built once at startup and never mutated.
#[derive(Debug)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub router: TwoPhaseRouter,
    pub metrics: MetricsAggregator,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let client = BackendClient::new(config.request_timeout)?;
        let router = TwoPhaseRouter::new(config.clone(), client.clone());
        let metrics = MetricsAggregator::new(client, &config);
        Ok(Self {
            config,
            router,
            metrics,
        })
    }

    pub async fn generate(
        &self,
        api_path: &str,
        request: GenerationRequest,
    ) -> ProxyResult<ProxyResponse> {
        self.router.route(request, api_path).await
    }

    pub async fn scrape_metrics(&self) -> ProxyResult<ScrapedMetrics> {
        self.metrics.aggregate().await
    }

    pub fn health(&self) -> HealthReport {
        let (prefill_transport, decode_transport) = match &self.config.addressing {
            Addressing::Http => (None, None),
            Addressing::Transport { prefill, decode } => {
                (Some(prefill.clone()), Some(decode.clone()))
            }
        };
        HealthReport {
            status: "healthy",
            mode: self.config.mode_name(),
            prefill: self.config.prefill_url.clone(),
            decode: self.config.decode_url.clone(),
            prefill_transport,
            decode_transport,
            delivery: self.config.delivery.as_str(),
        }
    }
}
