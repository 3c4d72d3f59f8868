//! The request scheduler.
//!
//! Requests enter a FIFO pending pool and are moved in batches to the
//! in-flight pool by a periodic drain, or immediately in eager mode. Each
//! in-flight request is sent on its own task and triaged when the
//! transport answers. A 429 puts the request back at the tail of pending;
//! every other outcome completes it exactly once.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::queue::{QueueDepth, RequestQueue};
use super::refresh::{spawn_refresh_job, RefreshKind};
use super::request::{
    header_map, ApiResponse, Completion, Dispatch, RequestFactory, RequestHandle, RequestOptions,
    RequestParams,
};
use super::triage::{triage, Verdict};
use crate::auth::Authenticator;
use crate::config::{BirdcallConfig, SchedulerConfig};
use crate::error::{BirdcallError, Result};
use crate::ratelimit::{RateLimitEntry, RateLimitTable};
use crate::resource::{ResourceId, ResourceRegistry, Verb};
use crate::transport::{Transport, TransportError};

/// Default number of requests started by [`Scheduler::drain_now`].
pub const DEFAULT_MANUAL_DRAIN: usize = 180;

/// Rate-limited request scheduler.
///
/// Cheap to clone; clones share the same queue and rate-limit table.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
}

pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    factory: RequestFactory,
    pub(super) table: RateLimitTable,
    queue: Mutex<RequestQueue>,
    pub(super) remote_config: RwLock<Option<serde_json::Value>>,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    batch_size: AtomicUsize,
    closed: AtomicBool,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: &BirdcallConfig,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        Self::with_registry(config, transport, authenticator, ResourceRegistry::twitter())
    }

    /// Create a scheduler tracking a custom set of resources.
    pub fn with_registry(
        config: &BirdcallConfig,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
        registry: &'static ResourceRegistry,
    ) -> Result<Self> {
        let scheduler = &config.scheduler;
        if scheduler.batch_size == 0 || scheduler.reduced_batch_size == 0 {
            return Err(BirdcallError::Config("batch sizes must be positive".into()));
        }
        if scheduler.drain_interval_secs == 0 {
            return Err(BirdcallError::Config("drain_interval_secs must be positive".into()));
        }

        let factory = RequestFactory::new(
            &config.urls.rest_base,
            header_map(&config.headers)?,
            registry,
        )?;

        Ok(Self {
            shared: Arc::new(Shared {
                config: scheduler.clone(),
                factory,
                table: RateLimitTable::new(registry),
                queue: Mutex::new(RequestQueue::new()),
                remote_config: RwLock::new(None),
                transport,
                authenticator,
                batch_size: AtomicUsize::new(scheduler.batch_size),
                closed: AtomicBool::new(false),
                jobs: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Spawn the periodic drain and, when enabled, the refresh jobs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.shared.closed.load(Ordering::Acquire) {
            warn!("Scheduler is shut down, not starting");
            return;
        }

        let mut jobs = self.shared.jobs.lock();
        if !jobs.is_empty() {
            warn!("Scheduler already started");
            return;
        }

        let weak = Arc::downgrade(&self.shared);
        jobs.push(spawn_drain_loop(weak.clone(), self.shared.config.drain_interval()));

        if self.shared.config.refresh_jobs {
            jobs.push(spawn_refresh_job(weak.clone(), RefreshKind::RateLimits));
            jobs.push(spawn_refresh_job(weak, RefreshKind::RemoteConfig));
        }

        info!(
            drain_interval_secs = self.shared.config.drain_interval_secs,
            batch_size = self.batch_size(),
            eager = self.shared.config.eager_dispatch,
            refresh_jobs = self.shared.config.refresh_jobs,
            "Scheduler started"
        );
    }

    /// Queue a request, delivering its result to `completion`.
    ///
    /// Malformed input is rejected here, before any network activity. A
    /// request with neither a completion nor a stream sink is rejected with
    /// [`BirdcallError::NoCallback`].
    pub fn enqueue(
        &self,
        verb: Verb,
        url: &str,
        params: RequestParams,
        options: RequestOptions,
        completion: Option<Completion>,
    ) -> Result<Uuid> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BirdcallError::Cancelled);
        }

        let skip_queue = options.skip_queue;
        let request = self.shared.factory.build(verb, url, params, options, completion)?;
        let id = request.id;

        debug!(
            id = %id,
            verb = %verb,
            url = %request.request.url,
            resource = ?request.resource.as_ref().map(ResourceId::as_str),
            skip_queue = skip_queue,
            "Request accepted"
        );

        let dispatch = if skip_queue {
            Some(self.shared.queue.lock().start(request))
        } else {
            let eager = self.shared.config.eager_dispatch
                && !request
                    .resource
                    .as_ref()
                    .is_some_and(|r| self.shared.table.should_defer(r));
            let batch = self.batch_size();
            self.shared.queue.lock().enqueue(request, eager, batch)
        };

        if let Some(dispatch) = dispatch {
            self.shared.spawn_dispatch(dispatch);
        }
        Ok(id)
    }

    /// Queue a request and get a future of its result.
    pub fn request(
        &self,
        verb: Verb,
        url: &str,
        params: RequestParams,
        options: RequestOptions,
    ) -> Result<RequestHandle> {
        let (tx, rx) = oneshot::channel();
        let id = self.enqueue(verb, url, params, options, Some(Completion::Reply(tx)))?;
        Ok(RequestHandle::new(id, rx))
    }

    /// Start up to `limit` pending requests now (180 when `None`).
    ///
    /// Returns how many were started.
    pub fn drain_now(&self, limit: Option<usize>) -> usize {
        self.shared.drain(limit.unwrap_or(DEFAULT_MANUAL_DRAIN))
    }

    /// Current batch size of the periodic drain.
    pub fn batch_size(&self) -> usize {
        self.shared.batch_size.load(Ordering::Relaxed)
    }

    /// Switch the periodic drain to the reduced batch size.
    pub fn reduce_drain_rate(&self) {
        self.shared.reduce_drain_rate();
    }

    /// Switch the periodic drain back to the normal batch size.
    pub fn restore_drain_rate(&self) {
        self.shared.restore_drain_rate();
    }

    /// Snapshot of every observed rate limit.
    pub fn rate_limits(&self) -> HashMap<ResourceId, RateLimitEntry> {
        self.shared.table.snapshot()
    }

    /// The rate-limit table.
    pub fn table(&self) -> &RateLimitTable {
        &self.shared.table
    }

    /// Most recently fetched remote configuration.
    pub fn remote_config(&self) -> Option<serde_json::Value> {
        self.shared.remote_config.read().clone()
    }

    pub fn queue_depth(&self) -> QueueDepth {
        self.shared.queue.lock().depth()
    }

    /// Stop background jobs and cancel every request still pending.
    ///
    /// Requests already in flight run to completion. Later calls to
    /// [`enqueue`](Self::enqueue) fail with [`BirdcallError::Cancelled`].
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);

        let jobs: Vec<_> = std::mem::take(&mut *self.shared.jobs.lock());
        for job in &jobs {
            job.abort();
        }
        join_all(jobs).await;

        let abandoned = self.shared.queue.lock().drain_pending();
        let cancelled = abandoned.len();
        for request in abandoned {
            request.finish(Err(BirdcallError::Cancelled)).await;
        }

        info!(cancelled = cancelled, "Scheduler shut down");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue_depth())
            .field("batch_size", &self.batch_size())
            .field("table", &self.shared.table)
            .finish()
    }
}

impl Shared {
    fn drain(self: &Arc<Self>, limit: usize) -> usize {
        let started = self.queue.lock().take(limit);
        let count = started.len();
        if count > 0 {
            debug!(started = count, "Drained pending requests");
        }
        for dispatch in started {
            self.spawn_dispatch(dispatch);
        }
        count
    }

    fn spawn_dispatch(self: &Arc<Self>, dispatch: Dispatch) {
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run(dispatch).await });
    }

    #[instrument(
        skip(self, dispatch),
        fields(id = %dispatch.id, verb = %dispatch.request.verb, url = %dispatch.request.url)
    )]
    async fn run(&self, dispatch: Dispatch) {
        let Dispatch {
            id,
            mut request,
            stream,
        } = dispatch;

        if let Err(e) = self.authenticator.authorize(&mut request) {
            warn!(error = %e, "Failed to authorize request");
            self.resolve(&id, Err(e)).await;
            return;
        }

        let streamed = stream.is_some();
        let outcome = match stream {
            // Streams stay open as long as the server keeps sending
            Some(sink) => self.transport.send_streaming(request, sink).await,
            None => {
                let timeout = self.config.request_timeout();
                match tokio::time::timeout(timeout, self.transport.send(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                }
            }
        };

        self.settle(&id, triage(outcome, streamed)).await;
    }

    async fn settle(&self, id: &Uuid, verdict: Verdict) {
        let settled = self.queue.lock().settle(id);
        let Some(mut request) = settled else {
            debug!("Request already resolved");
            return;
        };

        match verdict {
            Verdict::Success(response) => {
                if request.request.verb == Verb::Get {
                    if let Some(resource) = &request.resource {
                        self.table.observe(resource, &response.headers);
                    }
                }
                if self.config.escalate_on_rate_limit {
                    self.restore_drain_rate();
                }
                debug!(
                    status = response.status,
                    queued_ms = (Utc::now() - request.created_at).num_milliseconds(),
                    "Request succeeded"
                );
                request.finish(Ok(response)).await;
            }
            Verdict::RateLimited(headers) => {
                let observed = match &request.resource {
                    Some(resource) => self.table.observe(resource, &headers),
                    None => RateLimitEntry::from_headers(&headers),
                };
                let reset_in = observed.map(|entry| entry.duration_until_reset(Utc::now()));

                request.attempts += 1;
                if let Some(max) = self.config.max_rate_limit_retries {
                    if request.attempts > max {
                        warn!(attempts = request.attempts, "Giving up on rate-limited request");
                        let err = BirdcallError::RetriesExhausted {
                            url: request.request.url.to_string(),
                            attempts: request.attempts,
                        };
                        request.finish(Err(err)).await;
                        return;
                    }
                }

                if self.config.escalate_on_rate_limit {
                    self.reduce_drain_rate();
                }

                // Checked under the queue lock so shutdown cannot miss a requeue
                let cancelled = {
                    let mut queue = self.queue.lock();
                    if self.closed.load(Ordering::Acquire) {
                        Some(request)
                    } else {
                        warn!(
                            attempts = request.attempts,
                            reset_in_secs = reset_in.map(|d| d.as_secs()),
                            "Rate limited, requeueing"
                        );
                        queue.requeue(request);
                        None
                    }
                };
                if let Some(request) = cancelled {
                    debug!("Rate limited after shutdown, cancelling");
                    request.finish(Err(BirdcallError::Cancelled)).await;
                }
            }
            Verdict::Failed(e) => {
                debug!(error = %e, "Request failed");
                request.finish(Err(e)).await;
            }
        }
    }

    async fn resolve(&self, id: &Uuid, result: Result<ApiResponse>) {
        let request = self.queue.lock().settle(id);
        if let Some(request) = request {
            request.finish(result).await;
        }
    }

    fn reduce_drain_rate(&self) {
        let reduced = self.config.reduced_batch_size;
        if self.batch_size.swap(reduced, Ordering::Relaxed) != reduced {
            info!(batch_size = reduced, "Reduced drain rate");
        }
    }

    fn restore_drain_rate(&self) {
        let normal = self.config.batch_size;
        if self.batch_size.swap(normal, Ordering::Relaxed) != normal {
            info!(batch_size = normal, "Restored drain rate");
        }
    }
}

fn spawn_drain_loop(shared: Weak<Shared>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let batch = shared.batch_size.load(Ordering::Relaxed);
            shared.drain(batch);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use crate::error::RemoteError;
    use crate::ratelimit::{LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
    use crate::test_utils::{wait_for, GatedTransport, HangingTransport, StubTransport};
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use std::sync::atomic::AtomicU32;
    use tokio_test::{assert_pending, assert_ready};

    fn config(eager: bool) -> BirdcallConfig {
        let mut config = BirdcallConfig::default();
        config.urls.rest_base = "https://api.example.com/1.1".to_string();
        config.scheduler.eager_dispatch = eager;
        config.scheduler.refresh_jobs = false;
        config
    }

    fn scheduler(config: &BirdcallConfig, transport: &Arc<StubTransport>) -> Scheduler {
        Scheduler::new(config, transport.clone(), Arc::new(NoAuth)).unwrap()
    }

    fn rate_headers(remaining: u32) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LIMIT_HEADER, HeaderValue::from(180u32));
        headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(4_000_000_000i64));
        headers
    }

    #[tokio::test]
    async fn test_rate_limit_status_request() {
        let transport = Arc::new(StubTransport::new());
        let body = r#"{"resources":{"search":{
            "/search/tweets":{"limit":180,"remaining":180,"reset":4000000000}
        }}}"#;
        transport.push_response(200, rate_headers(179), body);
        let scheduler = scheduler(&config(true), &transport);

        let response = scheduler
            .request(
                Verb::Get,
                "/application/rate_limit_status",
                RequestParams::new(),
                RequestOptions::default(),
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(response.data["resources"]["search"]["/search/tweets"]["limit"], 180);
        let status = ResourceId::new(Verb::Get, "application/rate_limit_status");
        assert_eq!(scheduler.rate_limits()[&status].remaining, 179);
        assert_eq!(
            transport.requests()[0].url.as_str(),
            "https://api.example.com/1.1/application/rate_limit_status.json"
        );
    }

    #[tokio::test]
    async fn test_post_remote_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push_response(
            200,
            rate_headers(10),
            r#"{"errors":[{"code":139,"message":"You have already favorited this status."}]}"#,
        );
        let scheduler = scheduler(&config(true), &transport);

        let result = scheduler
            .request(
                Verb::Post,
                "favorites/create",
                RequestParams::new().content("id=123"),
                RequestOptions::default(),
            )
            .unwrap()
            .await;

        match result {
            Err(BirdcallError::Remote(e)) => assert_eq!(e.codes(), vec![139]),
            other => panic!("unexpected result {:?}", other),
        }

        let sent = &transport.requests()[0];
        assert_eq!(sent.headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
        assert_eq!(sent.body.as_deref(), Some("id=123"));
        assert!(scheduler.rate_limits().is_empty());
    }

    #[tokio::test]
    async fn test_post_success_does_not_update_table() {
        let transport = Arc::new(StubTransport::new());
        transport.push_response(200, rate_headers(10), r#"{"id":123,"favorited":true}"#);
        let scheduler = scheduler(&config(true), &transport);

        let response = scheduler
            .request(
                Verb::Post,
                "favorites/create",
                RequestParams::new().content("id=123"),
                RequestOptions::default(),
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(response.data["favorited"], true);
        assert!(scheduler.rate_limits().is_empty());
    }

    #[tokio::test]
    async fn test_undrained_request_stays_pending() {
        let transport = Arc::new(StubTransport::new());
        let scheduler = scheduler(&config(false), &transport);

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();
        let mut task = tokio_test::task::spawn(handle);

        assert_pending!(task.poll());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_pending!(task.poll());

        assert_eq!(scheduler.queue_depth(), QueueDepth { pending: 1, in_flight: 0 });
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_drain_now_is_fifo_and_bounded() {
        let transport = Arc::new(StubTransport::new());
        for _ in 0..3 {
            transport.push_json(200, "{}");
        }
        let scheduler = scheduler(&config(false), &transport);

        let mut handles = Vec::new();
        for path in ["statuses/show/1", "statuses/show/2", "statuses/show/3"] {
            handles.push(
                scheduler
                    .request(Verb::Get, path, RequestParams::new(), RequestOptions::default())
                    .unwrap(),
            );
        }

        assert_eq!(scheduler.drain_now(Some(2)), 2);
        let third = handles.pop().unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut sent: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        sent.sort();
        assert_eq!(sent, vec!["/1.1/statuses/show/1.json", "/1.1/statuses/show/2.json"]);
        assert_eq!(scheduler.queue_depth(), QueueDepth { pending: 1, in_flight: 0 });

        assert_eq!(scheduler.drain_now(None), 1);
        third.await.unwrap();
        assert_eq!(scheduler.queue_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried_on_next_drain() {
        let transport = Arc::new(StubTransport::new());
        transport.push_response(
            429,
            rate_headers(0),
            r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#,
        );
        transport.push_response(200, rate_headers(179), r#"{"statuses":[]}"#);
        let scheduler = scheduler(&config(false), &transport);

        let deliveries = Arc::new(AtomicU32::new(0));
        let counter = deliveries.clone();
        scheduler
            .enqueue(
                Verb::Get,
                "search/tweets",
                RequestParams::new().query("q", "rust"),
                RequestOptions::default(),
                Some(Completion::callback(move |result| {
                    assert!(result.is_ok());
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        scheduler.drain_now(None);
        wait_for(|| transport.requests().len() == 1 && scheduler.queue_depth().pending == 1).await;

        // The 429 never reaches the caller
        assert_eq!(deliveries.load(Ordering::SeqCst), 0);
        let search = ResourceId::new(Verb::Get, "search/tweets");
        assert_eq!(scheduler.rate_limits()[&search].remaining, 0);

        scheduler.drain_now(None);
        wait_for(|| deliveries.load(Ordering::SeqCst) == 1).await;

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(scheduler.rate_limits()[&search].remaining, 179);
        assert_eq!(scheduler.queue_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_rate_limit_retry_bound() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(429, "{}");
        transport.push_json(429, "{}");
        let mut config = config(false);
        config.scheduler.max_rate_limit_retries = Some(1);
        let scheduler = scheduler(&config, &transport);

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();

        scheduler.drain_now(None);
        wait_for(|| scheduler.queue_depth().pending == 1).await;
        scheduler.drain_now(None);

        match handle.await {
            Err(BirdcallError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_escalation_reduces_and_restores_batch() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(429, "{}");
        transport.push_json(200, "{}");
        let mut config = config(false);
        config.scheduler.escalate_on_rate_limit = true;
        let scheduler = scheduler(&config, &transport);

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();

        scheduler.drain_now(None);
        wait_for(|| scheduler.queue_depth().pending == 1).await;
        assert_eq!(scheduler.batch_size(), 5);

        scheduler.drain_now(None);
        handle.await.unwrap();
        assert_eq!(scheduler.batch_size(), 50);
    }

    #[tokio::test]
    async fn test_http_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(
            404,
            r#"{"errors":[{"code":34,"message":"Sorry, that page does not exist."}]}"#,
        );
        let scheduler = scheduler(&config(true), &transport);

        let result = scheduler
            .request(Verb::Get, "statuses/show/1", RequestParams::new(), RequestOptions::default())
            .unwrap()
            .await;

        match result {
            Err(BirdcallError::Http(e)) => {
                assert_eq!(e.status, 404);
                assert!(e.body.contains("does not exist"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(200, "not json");
        let scheduler = scheduler(&config(true), &transport);

        let result = scheduler
            .request(
                Verb::Get,
                "help/configuration",
                RequestParams::new(),
                RequestOptions::default(),
            )
            .unwrap()
            .await;

        assert!(matches!(
            result,
            Err(BirdcallError::Remote(RemoteError::MalformedBody(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let mut config = config(true);
        config.scheduler.request_timeout_secs = 5;
        let scheduler =
            Scheduler::new(&config, Arc::new(HangingTransport), Arc::new(NoAuth)).unwrap();

        let result = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap()
            .await;

        assert!(matches!(
            result,
            Err(BirdcallError::Transport(TransportError::Timeout(d))) if d == Duration::from_secs(5)
        ));
        assert_eq!(scheduler.queue_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_synchronous_errors_do_not_touch_network() {
        let transport = Arc::new(StubTransport::new());
        let scheduler = scheduler(&config(true), &transport);

        let absolute = scheduler.request(
            Verb::Get,
            "http://evil.example/x",
            RequestParams::new(),
            RequestOptions::default(),
        );
        assert!(matches!(absolute, Err(BirdcallError::Argument { .. })));

        let no_callback = scheduler.enqueue(
            Verb::Get,
            "search/tweets",
            RequestParams::new(),
            RequestOptions::default(),
            None,
        );
        assert!(matches!(no_callback, Err(BirdcallError::NoCallback)));

        assert!(transport.requests().is_empty());
        assert_eq!(scheduler.queue_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_eager_dispatch_waits_for_deferred_resource() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(200, "{}");
        let scheduler = scheduler(&config(true), &transport);

        let search = ResourceId::new(Verb::Get, "search/tweets");
        scheduler
            .table()
            .insert(&search, RateLimitEntry::new(180, 0, 4_000_000_000).unwrap());

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();
        assert_eq!(scheduler.queue_depth(), QueueDepth { pending: 1, in_flight: 0 });

        // Local state is only a hint; a drain still sends it
        scheduler.drain_now(None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_queue_jumps_ahead() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(200, r#"{"skipped":true}"#);
        let scheduler = scheduler(&config(false), &transport);

        let _waiting = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();
        let options = RequestOptions {
            skip_queue: true,
            ..Default::default()
        };
        let response = scheduler
            .request(Verb::Get, "help/configuration", RequestParams::new(), options)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(response.data["skipped"], true);
        assert_eq!(scheduler.queue_depth(), QueueDepth { pending: 1, in_flight: 0 });
    }

    #[tokio::test]
    async fn test_authorizer_failure_is_delivered() {
        struct Refuse;
        impl Authenticator for Refuse {
            fn authorize(&self, _request: &mut crate::transport::TransportRequest) -> Result<()> {
                Err(BirdcallError::Credential("no signing key".into()))
            }
        }

        let transport = Arc::new(StubTransport::new());
        let scheduler = Scheduler::new(&config(true), transport.clone(), Arc::new(Refuse)).unwrap();

        let result = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap()
            .await;

        assert!(matches!(result, Err(BirdcallError::Credential(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending() {
        let transport = Arc::new(StubTransport::new());
        let scheduler = scheduler(&config(false), &transport);
        scheduler.start();

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();

        scheduler.shutdown().await;

        assert!(matches!(handle.await, Err(BirdcallError::Cancelled)));
        let late = scheduler.request(
            Verb::Get,
            "search/tweets",
            RequestParams::new(),
            RequestOptions::default(),
        );
        assert!(matches!(late, Err(BirdcallError::Cancelled)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_during_shutdown_is_cancelled() {
        let transport = Arc::new(GatedTransport::new(429));
        let scheduler =
            Scheduler::new(&config(true), transport.clone(), Arc::new(NoAuth)).unwrap();

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();
        wait_for(|| transport.calls() == 1).await;
        assert_eq!(scheduler.queue_depth(), QueueDepth { pending: 0, in_flight: 1 });

        scheduler.shutdown().await;
        transport.open();

        assert!(matches!(handle.await, Err(BirdcallError::Cancelled)));
        assert_eq!(scheduler.queue_depth(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_start_after_shutdown_does_nothing() {
        let transport = Arc::new(StubTransport::new());
        let scheduler = scheduler(&config(false), &transport);

        scheduler.shutdown().await;
        scheduler.start();

        assert!(scheduler.shared.jobs.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_drain() {
        let transport = Arc::new(StubTransport::new());
        transport.push_json(200, "{}");
        let scheduler = scheduler(&config(false), &transport);
        scheduler.start();

        let handle = scheduler
            .request(Verb::Get, "search/tweets", RequestParams::new(), RequestOptions::default())
            .unwrap();
        let mut task = tokio_test::task::spawn(handle);
        assert_pending!(task.poll());

        tokio::time::sleep(Duration::from_secs(61)).await;
        wait_for(|| task.is_woken()).await;
        assert_ready!(task.poll()).unwrap();

        scheduler.shutdown().await;
    }

    #[test]
    fn test_rejects_zero_batch() {
        let mut config = config(true);
        config.scheduler.batch_size = 0;
        let result = Scheduler::new(&config, Arc::new(StubTransport::new()), Arc::new(NoAuth));
        assert!(matches!(result, Err(BirdcallError::Config(_))));
    }
}
