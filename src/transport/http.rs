//! `reqwest`-backed transport.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, warn};

use super::{StreamSink, Transport, TransportError, TransportRequest, TransportResponse};
use crate::resource::Verb;

/// Transport performing real HTTP calls with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with a default client.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: TransportRequest) -> RequestBuilder {
        let method = match request.verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
        };

        let mut builder = self
            .client
            .request(method, request.url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        debug!(verb = %request.verb, url = %request.url, "Sending request");

        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: TransportRequest,
        sink: StreamSink,
    ) -> Result<TransportResponse, TransportError> {
        debug!(verb = %request.verb, url = %request.url, "Opening stream");

        let mut response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if !response.status().is_success() {
            let body = response.bytes().await?.to_vec();
            return Ok(TransportResponse {
                status,
                headers,
                body,
            });
        }

        while let Some(chunk) = response.chunk().await? {
            if sink.send(Ok(chunk.to_vec())).await.is_err() {
                warn!(status = status, "Stream receiver dropped, closing connection");
                return Err(TransportError::SinkClosed);
            }
        }

        Ok(TransportResponse {
            status,
            headers,
            body: Vec::new(),
        })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}
