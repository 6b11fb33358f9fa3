use actix_web::error::JsonPayloadError;
use actix_web::middleware::Logger;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, get, post, web};
use log::info;

use crate::config::{Addressing, ProxyConfig};
use crate::error::ProxyError;
use crate::io_struct::GenerationRequest;
use crate::proxy_state::ProxyState;

#[get("/health")]
pub async fn health(app_state: web::Data<ProxyState>) -> HttpResponse {
    HttpResponse::Ok().json(app_state.health())
}

#[get("/metrics")]
pub async fn metrics(app_state: web::Data<ProxyState>) -> Result<HttpResponse, ProxyError> {
    let scraped = app_state.scrape_metrics().await?;
    Ok(HttpResponse::Ok()
        .content_type(scraped.content_type)
        .body(scraped.body))
}

#[post("/v1/completions")]
pub async fn completions(
    req: HttpRequest,
    body: web::Json<GenerationRequest>,
    app_state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    let response = app_state.generate(req.path(), body.into_inner()).await?;
    Ok(response.into())
}

#[post("/v1/chat/completions")]
pub async fn chat_completions(
    req: HttpRequest,
    body: web::Json<GenerationRequest>,
    app_state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    let response = app_state.generate(req.path(), body.into_inner()).await?;
    Ok(response.into())
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ProxyError::MalformedInboundRequest(err.to_string()).into()
}

/// Register the proxy routes. `/metrics` only exists when the deployment exposes it.
pub fn configure(cfg: &mut web::ServiceConfig, app_state: web::Data<ProxyState>) {
    let metrics_enabled = app_state.config.metrics_enabled();
    let json_config = web::JsonConfig::default()
        .limit(app_state.config.max_payload_size)
        .error_handler(json_error_handler);

    cfg.app_data(app_state)
        .app_data(json_config)
        .service(health)
        .service(completions)
        .service(chat_completions);
    if metrics_enabled {
        cfg.service(metrics);
    }
}

fn log_startup(config: &ProxyConfig) {
    info!("Starting {} proxy", config.mode_name());
    match &config.addressing {
        Addressing::Http => {
            info!("Prefill URL: {}", config.prefill_url);
            info!("Decode URL:  {}", config.decode_url);
        }
        Addressing::Transport { prefill, decode } => {
            info!(
                "Prefill URL: {} (transport: {})",
                config.prefill_url, prefill
            );
            info!("Decode URL:  {} (transport: {})", config.decode_url, decode);
        }
    }
    info!(
        "Delivery: {}, metrics route enabled: {}",
        config.delivery.as_str(),
        config.metrics_enabled()
    );
}

pub async fn startup(config: ProxyConfig) -> anyhow::Result<()> {
    let state = ProxyState::new(config)?;
    let config = state.config.clone();
    log_startup(&config);

    let app_state = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| configure(cfg, app_state.clone()))
    })
    .bind((config.host.as_str(), config.port))?;

    info!("Listening on {}:{}", config.host, config.port);
    server.run().await?;
    Ok(())
}
