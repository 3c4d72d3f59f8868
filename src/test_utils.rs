//! Test doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Transport answering from a script and recording what it was sent.
///
/// Runs out of script with a [`TransportError::Request`].
#[derive(Default)]
pub(crate) struct StubTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, headers: HeaderMap, body: &str) {
        self.responses.lock().push_back(Ok(TransportResponse {
            status,
            headers,
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn push_json(&self, status: u16, body: &str) {
        self.push_response(status, HeaderMap::new(), body);
    }

    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response".into())))
    }
}

/// Transport that never answers.
pub(crate) struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        std::future::pending().await
    }
}

/// Transport that holds every request until [`open`](Self::open) is called,
/// then answers each with a fixed status and an empty body.
pub(crate) struct GatedTransport {
    status: u16,
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedTransport {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of requests that reached the gate.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let opened = self.gate.notified();
        self.calls.fetch_add(1, Ordering::SeqCst);
        opened.await;
        Ok(TransportResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        })
    }
}

/// Yield to other tasks until `condition` holds.
///
/// Panics if it still does not hold after many rounds.
pub(crate) async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
