use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};

use crate::backend::BackendClient;
use crate::config::{DeliveryMode, ProxyConfig};
use crate::error::{ProxyError, ProxyResult};
use crate::io_struct::GenerationRequest;
use crate::proxy_state::ProxyResponse;
use crate::request_id::encode_request_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prefill,
    Decode,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prefill => write!(f, "prefill"),
            Phase::Decode => write!(f, "decode"),
        }
    }
}

/// Splits a generation request into a prefill call followed by a decode call.
///
/// Both calls carry the same correlation identifier. Prefill writes the KV
/// cache under that identifier and decode reads it, so decode is only issued
/// once prefill has fully completed.
#[derive(Debug, Clone)]
pub struct TwoPhaseRouter {
    config: Arc<ProxyConfig>,
    client: BackendClient,
}

impl TwoPhaseRouter {
    pub fn new(config: Arc<ProxyConfig>, client: BackendClient) -> Self {
        Self { config, client }
    }

    pub fn new_request_id(&self) -> String {
        let (prefill_addr, decode_addr) = self.config.identifier_addresses();
        encode_request_id(prefill_addr, decode_addr)
    }

    pub async fn route(
        &self,
        request: GenerationRequest,
        api_path: &str,
    ) -> ProxyResult<ProxyResponse> {
        let request_id = self.new_request_id();
        let prefill_request = request.to_prefill();
        let prefill_url = self.config.prefill_endpoint(api_path);
        let decode_url = self.config.decode_endpoint(api_path);

        info!("Routing request {}", request_id);
        debug!(
            "Request {}: prefill {} -> decode {} ({}, stream={})",
            request_id,
            prefill_url,
            decode_url,
            self.config.delivery.as_str(),
            request.is_stream()
        );

        self.run_prefill(prefill_request, prefill_url, request_id.clone())
            .await
            .inspect_err(|e| log_failure(&request_id, Phase::Prefill, e))?;

        info!("Prefill complete for {}, forwarding to decode", request_id);

        self.client
            .dispatch(self.config.delivery, &decode_url, &request, &request_id)
            .await
            .inspect_err(|e| log_failure(&request_id, Phase::Decode, e))
    }

    /// Runs prefill on its own task so a caller disconnect cannot cut it short
    /// while the backend is still writing the cache.
    async fn run_prefill(
        &self,
        prefill_request: GenerationRequest,
        url: String,
        request_id: String,
    ) -> ProxyResult<()> {
        let task = tokio::spawn(Self::prefill_once(
            self.client.clone(),
            self.config.delivery,
            url,
            prefill_request,
            request_id,
        ));

        task.await
            .map_err(|e| ProxyError::PrefillAborted(e.to_string()))?
    }

    async fn prefill_once(
        client: BackendClient,
        delivery: DeliveryMode,
        url: String,
        prefill_request: GenerationRequest,
        request_id: String,
    ) -> ProxyResult<()> {
        match delivery {
            DeliveryMode::Buffered => {
                client
                    .dispatch_buffered(&url, &prefill_request, &request_id)
                    .await?;
            }
            DeliveryMode::Streaming => {
                let drained = client
                    .dispatch_streaming(&url, &prefill_request, &request_id)
                    .await?
                    .drain()
                    .await?;
                debug!("Drained {} prefill bytes for {}", drained, request_id);
            }
        }
        Ok(())
    }
}

fn log_failure(request_id: &str, phase: Phase, err: &ProxyError) {
    error!("Request {} failed in {} phase: {}", request_id, phase, err);
}
