#![allow(dead_code)]

pub mod mock_backend;

use std::time::Duration;

use serde_json::Value;
use sgl_pd_proxy::ProxyConfig;
use sgl_pd_proxy::io_struct::GenerationRequest;

pub fn p2p_config(prefill_url: &str, decode_url: &str) -> ProxyConfig {
    ProxyConfig::p2p(
        prefill_url,
        decode_url,
        "prefill-node:14579",
        "decode-node:14579",
    )
}

pub fn fs_config(prefill_url: &str, decode_url: &str) -> ProxyConfig {
    ProxyConfig::fs_kv(prefill_url, decode_url)
}

pub fn generation_request(value: Value) -> GenerationRequest {
    serde_json::from_value(value).expect("generation request must be a JSON object")
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}
