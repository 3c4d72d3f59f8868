//! Transport abstraction between the scheduler and the network.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::error::BirdcallError;
use crate::resource::Verb;

/// Receiving end of a streamed response body.
///
/// Each item is a body chunk; a terminal failure arrives as a final `Err`.
pub type StreamSink = mpsc::Sender<Result<Vec<u8>, BirdcallError>>;

/// A fully prepared request, ready to be signed and sent.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub verb: Verb,
    /// Absolute URL, without query parameters
    pub url: Url,
    pub headers: HeaderMap,
    /// Query parameters, used for GET requests
    pub query: Vec<(String, String)>,
    /// Request body, used for POST requests
    pub body: Option<String>,
}

/// What came back from the server.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw body; empty when the body was forwarded to a stream sink
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failures where no HTTP response was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, TLS, or protocol failure
    #[error("request failed: {0}")]
    Request(String),

    /// The in-flight deadline expired
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The stream consumer stopped listening
    #[error("stream receiver closed")]
    SinkClosed,
}

/// Trait for the component that performs HTTP calls.
///
/// The scheduler only depends on this trait so tests can substitute a stub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the whole response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Send a request, forwarding a successful body to `sink` as it arrives.
    ///
    /// The default implementation buffers the body and forwards it as a
    /// single chunk. Non-2xx bodies are returned, not forwarded.
    async fn send_streaming(
        &self,
        request: TransportRequest,
        sink: StreamSink,
    ) -> Result<TransportResponse, TransportError> {
        let mut response = self.send(request).await?;
        if response.is_success() {
            let body = std::mem::take(&mut response.body);
            if !body.is_empty() && sink.send(Ok(body)).await.is_err() {
                return Err(TransportError::SinkClosed);
            }
        }
        Ok(response)
    }
}
