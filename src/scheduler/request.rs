//! Request preparation and completion plumbing.
//!
//! Everything that can be rejected about a request is rejected here, before
//! the request enters the queue.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use url::form_urlencoded;
use url::Url;
use uuid::Uuid;

use crate::error::{BirdcallError, RemoteError, Result};
use crate::ratelimit::RateLimitEntry;
use crate::resource::{ResourceId, ResourceRegistry, Verb};
use crate::transport::{StreamSink, TransportRequest};

/// Content type used for POST bodies when the caller gives none.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Query parameters and body of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    /// Query string pairs, appended to the URL
    pub query: Vec<(String, String)>,
    /// Raw POST body; required for POST
    pub content: Option<String>,
    /// Content type of `content`, defaults to form encoding
    pub content_type: Option<String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query string pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a raw body.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set a form-encoded body from key/value pairs.
    ///
    /// Strings are sent as-is, booleans and numbers as their text form, and
    /// nulls are skipped.
    pub fn form<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: AsRef<str>,
    {
        let mut encoder = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            encoder.append_pair(key.as_ref(), &text);
        }
        self.content = Some(encoder.finish());
        self.content_type = Some(FORM_CONTENT_TYPE.to_string());
        self
    }
}

/// Per-request dispatch options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Dispatch immediately instead of waiting for a drain
    pub skip_queue: bool,
    /// Forward the response body here instead of parsing it
    pub stream: Option<StreamSink>,
    /// Headers merged over the defaults; these win
    pub headers: BTreeMap<String, String>,
}

/// A successful API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body, `Null` for streamed responses
    pub data: serde_json::Value,
    /// Raw body bytes, empty for streamed responses
    pub body: Vec<u8>,
    /// Rate-limit state carried by the response, if any
    pub rate_limit: Option<RateLimitEntry>,
}

impl ApiResponse {
    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| BirdcallError::Remote(RemoteError::MalformedBody(e)))
    }
}

/// Where the terminal result of a request is delivered.
pub enum Completion {
    /// Resolve a [`RequestHandle`]
    Reply(oneshot::Sender<Result<ApiResponse>>),
    /// Invoke a callback from the dispatch task
    Callback(Box<dyn FnOnce(Result<ApiResponse>) + Send + 'static>),
}

impl Completion {
    /// Wrap a closure.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Result<ApiResponse>) + Send + 'static,
    {
        Completion::Callback(Box::new(f))
    }

    fn complete(self, result: Result<ApiResponse>) {
        match self {
            Completion::Reply(tx) => {
                // Receiver gone means the caller stopped waiting
                let _ = tx.send(result);
            }
            Completion::Callback(f) => f(result),
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Reply(_) => f.write_str("Completion::Reply"),
            Completion::Callback(_) => f.write_str("Completion::Callback"),
        }
    }
}

/// Future resolving to the terminal result of a queued request.
///
/// Resolves to [`BirdcallError::Cancelled`] if the scheduler drops the
/// request without completing it.
#[derive(Debug)]
pub struct RequestHandle {
    id: Uuid,
    receiver: oneshot::Receiver<Result<ApiResponse>>,
}

impl RequestHandle {
    pub(crate) fn new(id: Uuid, receiver: oneshot::Receiver<Result<ApiResponse>>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for RequestHandle {
    type Output = Result<ApiResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(BirdcallError::Cancelled)))
    }
}

/// A request that passed validation, as it waits in the queue.
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    pub id: Uuid,
    pub request: TransportRequest,
    pub resource: Option<ResourceId>,
    pub completion: Option<Completion>,
    pub stream: Option<StreamSink>,
    pub created_at: DateTime<Utc>,
    /// Number of 429 answers received so far
    pub attempts: u32,
}

/// What a dispatch task needs to perform one attempt.
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub id: Uuid,
    pub request: TransportRequest,
    pub stream: Option<StreamSink>,
}

impl QueuedRequest {
    pub fn dispatch(&self) -> Dispatch {
        Dispatch {
            id: self.id,
            request: self.request.clone(),
            stream: self.stream.clone(),
        }
    }

    /// Deliver the terminal result.
    ///
    /// Stream-only requests receive failures as the final stream item.
    pub async fn finish(self, result: Result<ApiResponse>) {
        match (self.completion, self.stream) {
            (Some(completion), _) => completion.complete(result),
            (None, Some(sink)) => {
                if let Err(e) = result {
                    let _ = sink.send(Err(e)).await;
                }
            }
            (None, None) => {}
        }
    }
}

/// Turns caller input into queued requests.
#[derive(Debug)]
pub(crate) struct RequestFactory {
    rest_base: String,
    default_headers: HeaderMap,
    registry: &'static ResourceRegistry,
}

impl RequestFactory {
    pub fn new(
        rest_base: &str,
        default_headers: HeaderMap,
        registry: &'static ResourceRegistry,
    ) -> Result<Self> {
        Url::parse(rest_base).map_err(|e| {
            BirdcallError::Config(format!("invalid rest_base {}: {}", rest_base, e))
        })?;
        Ok(Self {
            rest_base: rest_base.trim_end_matches('/').to_string(),
            default_headers,
            registry,
        })
    }

    /// Validate and normalise a request.
    pub fn build(
        &self,
        verb: Verb,
        raw_url: &str,
        params: RequestParams,
        options: RequestOptions,
        completion: Option<Completion>,
    ) -> Result<QueuedRequest> {
        if completion.is_none() && options.stream.is_none() {
            return Err(BirdcallError::NoCallback);
        }

        let path = normalize_path(raw_url)?;
        let url = Url::parse(&format!("{}{}", self.rest_base, path))
            .map_err(|e| BirdcallError::argument("url", &format!("is not a valid path ({})", e)))?;

        let mut headers = self.default_headers.clone();
        let body = match verb {
            Verb::Post => {
                let content = params
                    .content
                    .ok_or_else(|| BirdcallError::argument_required("params.content", "for POST"))?;
                let content_type = params.content_type.as_deref().unwrap_or(FORM_CONTENT_TYPE);
                let value = HeaderValue::from_str(content_type).map_err(|_| {
                    BirdcallError::argument("params.content_type", "is not a valid header value")
                })?;
                headers.insert(CONTENT_TYPE, value);
                Some(content)
            }
            Verb::Get => {
                if params.content.is_some() {
                    return Err(BirdcallError::argument("params.content", "is only valid for POST"));
                }
                None
            }
        };

        for (name, value) in header_map(&options.headers)? {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }

        Ok(QueuedRequest {
            id: Uuid::new_v4(),
            resource: self.registry.identify(&path, verb),
            request: TransportRequest {
                verb,
                url,
                headers,
                query: params.query,
                body,
            },
            completion,
            stream: options.stream,
            created_at: Utc::now(),
            attempts: 0,
        })
    }
}

/// Normalise a caller-supplied relative URL.
///
/// Prefixes `/` when missing and appends `.json` when the last segment has
/// no extension. Any query string is kept. Absolute URLs are rejected.
pub fn normalize_path(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BirdcallError::argument("url", "must not be empty"));
    }
    if raw.starts_with("//") || Url::parse(raw).is_ok() {
        return Err(BirdcallError::argument("url", "must be a relative URL"));
    }

    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };

    let mut normalized = String::with_capacity(raw.len() + 6);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path.trim_end_matches('/'));

    let last = normalized.rsplit('/').next().unwrap_or_default();
    if !last.contains('.') {
        normalized.push_str(".json");
    }

    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    Ok(normalized)
}

/// Convert configured header pairs into a `HeaderMap`.
pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| {
                BirdcallError::argument("headers", &format!("has an invalid name {:?}", name))
            })?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| {
                BirdcallError::argument("headers", &format!("has an invalid value for {}", name))
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
