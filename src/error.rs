use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The backend answered with something other than 200.
    #[error("Request failed: {status} - {body}")]
    BackendStatus { status: u16, body: String },

    /// The backend could not be reached or the connection broke.
    #[error("Request failed: {0}")]
    BackendConnection(#[source] reqwest::Error),

    #[error("Request to {url} timed out after {}s", .after.as_secs())]
    BackendTimeout { url: String, after: Duration },

    #[error("Malformed request body: {0}")]
    MalformedInboundRequest(String),

    #[error("Unable to fetch backend metrics: {0}")]
    AllMetricsProbesFailed(String),

    #[error("Prefill task aborted: {0}")]
    PrefillAborted(String),
}

impl ProxyError {
    /// Classify a transport error, separating out the call ceiling.
    pub fn from_reqwest(err: reqwest::Error, url: &str, ceiling: Duration) -> Self {
        if err.is_timeout() {
            ProxyError::BackendTimeout {
                url: url.to_string(),
                after: ceiling,
            }
        } else {
            ProxyError::BackendConnection(err)
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MalformedInboundRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::AllMetricsProbesFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
