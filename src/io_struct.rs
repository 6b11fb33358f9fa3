use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MAX_TOKENS: &str = "max_tokens";
pub const MAX_COMPLETION_TOKENS: &str = "max_completion_tokens";

/// An OpenAI-style completions or chat request, kept as an opaque JSON object.
///
/// Only the token limit fields are ever touched; everything else is forwarded
/// as received.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GenerationRequest(Map<String, Value>);

impl GenerationRequest {
    /// Copy of this request that only runs prefill: one output token, so the
    /// engine computes the KV cache for the prompt and stops.
    pub fn to_prefill(&self) -> GenerationRequest {
        let mut fields = self.0.clone();
        fields.insert(MAX_TOKENS.to_string(), Value::from(1));
        if fields.contains_key(MAX_COMPLETION_TOKENS) {
            fields.insert(MAX_COMPLETION_TOKENS.to_string(), Value::from(1));
        }
        GenerationRequest(fields)
    }

    pub fn is_stream(&self) -> bool {
        self.0
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
