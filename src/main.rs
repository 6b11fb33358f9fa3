use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{LevelFilter, error};
use sgl_pd_proxy::config::{
    DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_TRANSPORTS, DeliveryMode, ProxyConfig, ProxyMode,
};
use sgl_pd_proxy::{logging, server};

/// Prefill/decode disaggregation proxy
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Cache transfer setup: shared filesystem or point-to-point
    #[arg(long, env = "PROXY_MODE", value_enum, default_value_t = ProxyMode::P2p)]
    mode: ProxyMode,

    /// HTTP base URL of the prefill engine [default depends on --mode]
    #[arg(long, env = "PREFILL_URL")]
    prefill_url: Option<String>,

    /// HTTP base URL of the decode engine [default depends on --mode]
    #[arg(long, env = "DECODE_URL")]
    decode_url: Option<String>,

    /// Point-to-point transport address of the prefill engine (host:port)
    #[arg(long, env = "PREFILL_ZMQ", default_value = DEFAULT_TRANSPORTS.0)]
    prefill_zmq: String,

    /// Point-to-point transport address of the decode engine (host:port)
    #[arg(long, env = "DECODE_ZMQ", default_value = DEFAULT_TRANSPORTS.1)]
    decode_zmq: String,

    /// Override the delivery mode implied by --mode
    #[arg(long, env = "PROXY_DELIVERY", value_enum)]
    delivery: Option<DeliveryMode>,

    #[arg(long, env = "PROXY_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PROXY_PORT", default_value_t = 8080)]
    port: u16,

    /// Ceiling for each prefill or decode call
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 6 * 60 * 60)]
    request_timeout_secs: u64,

    /// Ceiling for each backend metrics request
    #[arg(long, env = "METRICS_TIMEOUT_SECS", default_value_t = 10)]
    metrics_timeout_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_PAYLOAD_SIZE", default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    max_payload_size: usize,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: LevelFilter,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ProxyConfig> {
        let (prefill_default, decode_default) = self.mode.default_urls();
        let prefill_url = self.prefill_url.as_deref().unwrap_or(prefill_default);
        let decode_url = self.decode_url.as_deref().unwrap_or(decode_default);

        let mut config = match self.mode {
            ProxyMode::Fs => ProxyConfig::fs_kv(prefill_url, decode_url),
            ProxyMode::P2p => {
                ProxyConfig::p2p(prefill_url, decode_url, self.prefill_zmq, self.decode_zmq)
            }
        };
        if let Some(delivery) = self.delivery {
            config = config.with_delivery(delivery);
        }
        config.host = self.host;
        config.port = self.port;
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.metrics_timeout = Duration::from_secs(self.metrics_timeout_secs);
        config.max_payload_size = self.max_payload_size;
        config.validate()?;
        Ok(config)
    }
}

#[actix_web::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.log_level);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    match server::startup(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
