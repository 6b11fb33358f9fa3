use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::DeliveryMode;
use crate::error::{ProxyError, ProxyResult};
use crate::proxy_state::{ProxyResponse, ProxyResponseBody};
use crate::request_id::REQUEST_ID_HEADER;

/// Largest chunk handed to the caller in streaming mode.
pub const CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// chunks buffered between the backend reader and the caller
const CHANNEL_CAPACITY: usize = 32;

/// A complete backend response body.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub body: Bytes,
    pub content_type: String,
}

/// Outbound HTTP calls to the prefill and decode engines.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// POST `payload` to `url` tagged with `request_id`. Fails on anything but 200.
    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        request_id: &str,
    ) -> ProxyResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, request_id)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, url, self.request_timeout))?;
        ensure_ok(response).await
    }

    /// Dispatch and wait for the whole body.
    pub async fn dispatch_buffered<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        request_id: &str,
    ) -> ProxyResult<BufferedResponse> {
        let response = self.post(url, payload, request_id).await?;
        let content_type = content_type_of(response.headers(), DEFAULT_CONTENT_TYPE);
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, url, self.request_timeout))?;
        Ok(BufferedResponse { body, content_type })
    }

    /// Dispatch and return as soon as the response headers are in.
    pub async fn dispatch_streaming<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        request_id: &str,
    ) -> ProxyResult<ChunkStream> {
        let response = self.post(url, payload, request_id).await?;
        Ok(ChunkStream::open(response, url.to_string(), self.request_timeout))
    }

    pub async fn dispatch<T: Serialize + ?Sized>(
        &self,
        mode: DeliveryMode,
        url: &str,
        payload: &T,
        request_id: &str,
    ) -> ProxyResult<ProxyResponse> {
        match mode {
            DeliveryMode::Buffered => {
                let BufferedResponse { body, content_type } =
                    self.dispatch_buffered(url, payload, request_id).await?;
                Ok(ProxyResponse {
                    status: StatusCode::OK,
                    content_type,
                    body: ProxyResponseBody::Full(body),
                })
            }
            DeliveryMode::Streaming => {
                let stream = self.dispatch_streaming(url, payload, request_id).await?;
                Ok(ProxyResponse {
                    status: StatusCode::OK,
                    content_type: stream.content_type().to_string(),
                    body: ProxyResponseBody::Stream(stream),
                })
            }
        }
    }

    /// GET `url` with its own ceiling. Used for metrics scrapes.
    pub async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        default_content_type: &str,
    ) -> ProxyResult<BufferedResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, url, timeout))?;
        let response = ensure_ok(response).await?;
        let content_type = content_type_of(response.headers(), default_content_type);
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, url, timeout))?;
        Ok(BufferedResponse { body, content_type })
    }
}

async fn ensure_ok(response: reqwest::Response) -> ProxyResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    Err(ProxyError::BackendStatus {
        status: status.as_u16(),
        body,
    })
}

fn content_type_of(headers: &HeaderMap, default: &str) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
        .to_string()
}

/// Finite, one-shot sequence of body chunks of at most [`CHUNK_SIZE`] bytes.
///
/// A reader task owns the backend response and feeds a bounded channel. Dropping
/// the stream closes the channel, which stops the reader and releases the
/// backend connection even if the backend is idle at that moment.
pub struct ChunkStream {
    content_type: String,
    inner: ReceiverStream<ProxyResult<Bytes>>,
}

impl ChunkStream {
    fn open(response: reqwest::Response, url: String, ceiling: Duration) -> Self {
        let content_type = content_type_of(response.headers(), DEFAULT_CONTENT_TYPE);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Receiver for {} went away, closing backend stream", url);
                        return;
                    }
                    next = body.next() => next,
                };
                match next {
                    Some(Ok(mut bytes)) => {
                        while !bytes.is_empty() {
                            let chunk = bytes.split_to(bytes.len().min(CHUNK_SIZE));
                            if tx.send(Ok(chunk)).await.is_err() {
                                debug!("Receiver for {} went away, closing backend stream", url);
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let err = ProxyError::from_reqwest(e, &url, ceiling);
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                    None => return,
                }
            }
        });

        ChunkStream {
            content_type,
            inner: ReceiverStream::new(rx),
        }
    }

    #[cfg(test)]
    fn from_chunks(content_type: impl Into<String>, chunks: Vec<ProxyResult<Bytes>>) -> Self {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // capacity covers every chunk
            let _ = tx.try_send(chunk);
        }
        ChunkStream {
            content_type: content_type.into(),
            inner: ReceiverStream::new(rx),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Consume the whole body, discarding it. Returns the number of bytes read.
    pub async fn drain(mut self) -> ProxyResult<usize> {
        let mut total = 0;
        while let Some(chunk) = self.next().await {
            total += chunk?.len();
        }
        Ok(total)
    }
}

impl Stream for ChunkStream {
    type Item = ProxyResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}
