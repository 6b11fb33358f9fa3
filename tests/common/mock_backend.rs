// Mock prefill/decode engine used by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use bytes::Bytes;
use futures::stream;
use serde_json::{Value, json};

/// How the mock answers completion calls.
#[derive(Clone, Debug)]
pub enum Reply {
    /// 200 with a JSON body
    Json(Value),
    /// Arbitrary status with a plain text body
    Status(u16, String),
    /// 200 with `body` streamed in pieces of `piece` bytes
    Chunked {
        body: Vec<u8>,
        piece: usize,
        content_type: String,
    },
    /// 200 with a `piece`-byte event every `interval_ms`. `None` never ends.
    Paced {
        piece: usize,
        pieces: Option<usize>,
        interval_ms: u64,
    },
}

#[derive(Clone, Debug)]
pub struct MockBackendConfig {
    pub completion: Reply,
    /// `None` answers `/metrics` with 404
    pub metrics: Option<String>,
    pub response_delay_ms: u64,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            completion: Reply::Json(json!({"id": "cmpl-1", "object": "text_completion"})),
            metrics: None,
            response_delay_ms: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub path: String,
    pub request_id: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
    /// Calls are numbered across all mocks sharing a clock
    pub sequence: usize,
}

/// Shared counter so calls on different backends can be ordered.
#[derive(Clone, Default)]
pub struct CallClock(Arc<AtomicUsize>);

impl CallClock {
    fn tick(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

struct MockState {
    config: MockBackendConfig,
    calls: Mutex<Vec<RecordedCall>>,
    completed: AtomicUsize,
    metrics_hits: AtomicUsize,
    streams_finished: AtomicUsize,
    streams_dropped: AtomicUsize,
    clock: CallClock,
}

pub struct MockBackend {
    pub url: String,
    state: Arc<MockState>,
    handle: ServerHandle,
}

impl MockBackend {
    pub async fn start(config: MockBackendConfig) -> MockBackend {
        Self::start_with_clock(config, CallClock::default()).await
    }

    pub async fn start_with_clock(config: MockBackendConfig, clock: CallClock) -> MockBackend {
        let state = Arc::new(MockState {
            config,
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            metrics_hits: AtomicUsize::new(0),
            streams_finished: AtomicUsize::new(0),
            streams_dropped: AtomicUsize::new(0),
            clock,
        });

        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/metrics", web::get().to(metrics_handler))
                .default_service(web::to(completion_handler))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind mock backend");

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        MockBackend {
            url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    /// Completion handlers that ran past their response delay.
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    pub fn metrics_hits(&self) -> usize {
        self.state.metrics_hits.load(Ordering::SeqCst)
    }

    /// Paced bodies the client read to the end.
    pub fn streams_finished(&self) -> usize {
        self.state.streams_finished.load(Ordering::SeqCst)
    }

    /// Paced bodies abandoned before their end, i.e. the client hung up.
    pub fn streams_dropped(&self) -> usize {
        self.state.streams_dropped.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// A URL nothing listens on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

async fn completion_handler(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<MockState>,
) -> HttpResponse {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let call = RecordedCall {
        path: req.path().to_string(),
        request_id: header("x-request-id"),
        content_type: header("content-type"),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        sequence: state.clock.tick(),
    };
    state.calls.lock().unwrap().push(call);

    if state.config.response_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(state.config.response_delay_ms)).await;
    }
    state.completed.fetch_add(1, Ordering::SeqCst);

    match &state.config.completion {
        Reply::Json(value) => HttpResponse::Ok().json(value),
        Reply::Status(status, text) => {
            let status = actix_web::http::StatusCode::from_u16(*status).unwrap();
            HttpResponse::build(status)
                .content_type("text/plain")
                .body(text.clone())
        }
        Reply::Chunked {
            body,
            piece,
            content_type,
        } => {
            let pieces: Vec<Result<Bytes, actix_web::Error>> = body
                .chunks(*piece)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            HttpResponse::Ok()
                .content_type(content_type.clone())
                .streaming(stream::iter(pieces))
        }
        Reply::Paced {
            piece,
            pieces,
            interval_ms,
        } => {
            let body = PacedBody {
                state: state.clone().into_inner(),
                piece: Bytes::from(vec![b'x'; *piece]),
                remaining: *pieces,
                interval: Duration::from_millis(*interval_ms),
                finished: false,
            };
            HttpResponse::Ok()
                .content_type("text/event-stream")
                .streaming(stream::unfold(body, PacedBody::next_piece))
        }
    }
}

/// Body of a paced reply. Records whether it ran to the end or was dropped early.
struct PacedBody {
    state: Arc<MockState>,
    piece: Bytes,
    remaining: Option<usize>,
    interval: Duration,
    finished: bool,
}

impl PacedBody {
    async fn next_piece(mut self) -> Option<(Result<Bytes, actix_web::Error>, PacedBody)> {
        if self.remaining == Some(0) {
            self.finished = true;
            self.state.streams_finished.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        tokio::time::sleep(self.interval).await;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        let piece = self.piece.clone();
        Some((Ok(piece), self))
    }
}

impl Drop for PacedBody {
    fn drop(&mut self) {
        if !self.finished {
            self.state.streams_dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

async fn metrics_handler(state: web::Data<MockState>) -> HttpResponse {
    state.metrics_hits.fetch_add(1, Ordering::SeqCst);
    match &state.config.metrics {
        Some(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(text.clone()),
        None => HttpResponse::NotFound().finish(),
    }
}
