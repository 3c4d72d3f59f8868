//! The pending and in-flight pools.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::request::{Dispatch, QueuedRequest};

/// Number of requests in each pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub pending: usize,
    pub in_flight: usize,
}

/// FIFO of pending requests plus the set of requests being sent.
///
/// An unresolved request lives in exactly one of the two pools. Callers
/// serialise access through a mutex.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    pending: VecDeque<QueuedRequest>,
    in_flight: HashMap<Uuid, QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new request.
    ///
    /// With `eager` set the request is started at once, as long as nothing
    /// older is waiting and fewer than `batch` requests are in flight.
    pub fn enqueue(
        &mut self,
        request: QueuedRequest,
        eager: bool,
        batch: usize,
    ) -> Option<Dispatch> {
        if eager && self.pending.is_empty() && self.in_flight.len() < batch {
            return Some(self.start(request));
        }
        self.pending.push_back(request);
        None
    }

    /// Move a request straight to in-flight.
    pub fn start(&mut self, request: QueuedRequest) -> Dispatch {
        let dispatch = request.dispatch();
        self.in_flight.insert(request.id, request);
        dispatch
    }

    /// Start up to `limit` requests from the front of pending.
    pub fn take(&mut self, limit: usize) -> Vec<Dispatch> {
        let count = limit.min(self.pending.len());
        let mut started = Vec::with_capacity(count);
        for request in self.pending.drain(..count) {
            let dispatch = request.dispatch();
            self.in_flight.insert(request.id, request);
            started.push(dispatch);
        }
        started
    }

    /// Remove a request from in-flight once its attempt is over.
    ///
    /// Returns `None` if the request was already resolved.
    pub fn settle(&mut self, id: &Uuid) -> Option<QueuedRequest> {
        self.in_flight.remove(id)
    }

    /// Put a request back at the tail of pending.
    pub fn requeue(&mut self, request: QueuedRequest) {
        self.pending.push_back(request);
    }

    /// Empty the pending pool.
    pub fn drain_pending(&mut self) -> Vec<QueuedRequest> {
        self.pending.drain(..).collect()
    }

    pub fn depth(&self) -> QueueDepth {
        QueueDepth {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
        }
    }
}
