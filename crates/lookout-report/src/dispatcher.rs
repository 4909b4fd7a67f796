//! Report dispatcher
//!
//! The [`Dispatcher`] turns a stream of schema-less payloads into bounded
//! network deliveries. It owns the dispatch queue, the offline buffer and
//! the background tasks that drive them.
//!
//! ## Flow
//!
//! ```text
//! report_error / report_performance
//!        │
//!   sanitize ─→ sample ─→ level filter ─→ stamp ─→ hook ─→ integrations
//!        │
//!   ┌────┴─────────────── batch_report? ───────────────┐
//!   │ yes                                              │ no
//!   ▼                                                  ▼
//! DispatchQueue ──(tick / size / drain)──→ flush   deliver_single
//!   │                       │                          │ beacon or POST,
//!   │             offline ──┴──→ OfflineBuffer          │ fixed-delay retry
//!   ▼                                                  ▼
//! Transport (batch envelope)                      Transport (bare payload)
//! ```
//!
//! ## Concurrency
//!
//! Queue, offline buffer, the `sending` flag and the online flag live
//! behind one `std::sync::Mutex` that is never held across an `.await`.
//! The single-flight check and the `sending` flag are set under that lock
//! before the transport is called.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lookout_core::config::Config;
use lookout_core::domain::{AppStamp, BatchEnvelope, Category, Payload, ReportItem};
use lookout_core::ports::{
    DeliveryMode, DropReason, IDispatchObserver, IIntegration, IReportTransport, NoopObserver,
};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connectivity::watch_connectivity;
use crate::filter::{apply_hook, BeforeReport, HookDecision, ReportFilter, SampleSource};
use crate::integrations::IntegrationSet;
use crate::queue::{DispatchQueue, OfflineBuffer};
use crate::retry::RetryPolicy;
use crate::sanitize::PayloadSanitizer;
use crate::scheduler::BatchScheduler;
use crate::ReportError;

/// Logs a send attempt at `info` in debug mode and at `debug` otherwise.
macro_rules! send_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

// ============================================================================
// Public result types
// ============================================================================

/// What happened to a payload handed to an ingestion entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Appended to the dispatch queue (batched mode)
    Queued,
    /// Handed to an individual delivery task (non-batched mode)
    Dispatched,
    /// Rejected by the sample rate
    SampledOut,
    /// Rejected by the report level filter
    Filtered,
    /// Vetoed by the before-report hook
    Vetoed,
    /// The dispatcher has been torn down
    Closed,
}

/// Result of a single [`Dispatcher::flush_batch`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue empty or a flush already in flight
    Skipped,
    /// Batch moved to the offline buffer
    Offlined(usize),
    /// Batch handed off successfully
    Delivered(usize),
    /// Batch failed; `retained` went back to the head of the queue
    Failed { retained: usize, dropped: usize },
}

/// Snapshot of the dispatcher's shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStatus {
    pub queued: usize,
    pub offline: usize,
    pub sending: bool,
    pub online: bool,
    pub destroyed: bool,
}

// ============================================================================
// Internal state
// ============================================================================

#[derive(Debug)]
struct DispatchState {
    queue: DispatchQueue,
    offline: OfflineBuffer,
    sending: bool,
    online: bool,
    destroyed: bool,
}

/// Values read from the configuration once at construction
#[derive(Debug, Clone)]
struct Settings {
    batch_report: bool,
    batch_size: usize,
    use_beacon: bool,
    has_endpoint: bool,
    eager_drain: bool,
    verbose: bool,
}

struct Inner {
    settings: Settings,
    stamp: AppStamp,
    filter: ReportFilter,
    retry: RetryPolicy,
    sanitizer: Option<PayloadSanitizer>,
    hook: Option<BeforeReport>,
    integrations: IntegrationSet,
    transport: Arc<dyn IReportTransport>,
    observer: Arc<dyn IDispatchObserver>,
    state: Mutex<DispatchState>,
    flush_signal: Arc<Notify>,
    shutdown: CancellationToken,
    runtime: Handle,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_depth(&self) {
        let (queued, offline) = {
            let state = self.state();
            (state.queue.len(), state.offline.len())
        };
        self.observer.on_depth(queued, offline);
    }

    /// Sends one batch envelope; returns whether it was handed off.
    async fn send_batch(&self, batch: &[ReportItem]) -> bool {
        let count = batch.len();
        if !self.settings.has_endpoint {
            send_log!(
                self.settings.verbose,
                count,
                "Report endpoint is not configured, skipping batch report"
            );
            self.observer.on_delivered(DeliveryMode::Batch, count);
            return true;
        }

        let body = match serde_json::to_value(BatchEnvelope::new(batch)) {
            Ok(body) => body,
            Err(e) => {
                warn!(count, error = %e, "Failed to serialize batch envelope");
                self.observer.on_failed(DeliveryMode::Batch, count);
                return false;
            }
        };

        send_log!(self.settings.verbose, count, "Sending batch report");
        match self.transport.post(&body).await {
            Ok(()) => {
                send_log!(self.settings.verbose, count, "Batch report delivered");
                self.observer.on_delivered(DeliveryMode::Batch, count);
                true
            }
            Err(e) => {
                warn!(count, error = %e, "Batch report delivery failed");
                self.observer.on_failed(DeliveryMode::Batch, count);
                false
            }
        }
    }

    /// Delivers one item on the non-batched path, retrying after
    /// `retry_interval` until the budget is spent.
    async fn deliver_single(&self, mut item: ReportItem) {
        loop {
            {
                let mut state = self.state();
                if !state.online {
                    debug!(item_id = item.id(), "Offline, buffering report");
                    state.offline.push(item);
                    drop(state);
                    self.observer.on_offlined(1);
                    self.publish_depth();
                    return;
                }
            }

            if !self.settings.has_endpoint {
                send_log!(
                    self.settings.verbose,
                    item_id = item.id(),
                    "Report endpoint is not configured, skipping report"
                );
                self.observer.on_delivered(DeliveryMode::Single, 1);
                return;
            }

            let body = Value::Object(item.payload().clone());
            send_log!(
                self.settings.verbose,
                item_id = item.id(),
                category = ?item.category(),
                attempt = item.retry_count() + 1,
                "Sending report"
            );

            if self.settings.use_beacon
                && self.transport.supports_beacon()
                && self.transport.send_beacon(&body)
            {
                send_log!(self.settings.verbose, item_id = item.id(), "Report handed to beacon");
                self.observer.on_delivered(DeliveryMode::Beacon, 1);
                return;
            }

            match self.transport.post(&body).await {
                Ok(()) => {
                    self.observer.on_delivered(DeliveryMode::Single, 1);
                    return;
                }
                Err(e) => {
                    warn!(item_id = item.id(), error = %e, "Report delivery failed");
                    self.observer.on_failed(DeliveryMode::Single, 1);
                    if !self.retry.record_failure(&mut item) {
                        self.observer.on_dropped(DropReason::RetryBudget, 1);
                        return;
                    }
                    tokio::time::sleep(self.retry.retry_interval).await;
                }
            }
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Batching, retrying, online/offline-aware report dispatcher
///
/// Cheap to clone; all clones share one queue. Must be built inside a
/// tokio runtime (or given a [`Handle`]) because it spawns its scheduler
/// and delivery tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lookout_core::config::ConfigBuilder;
/// use lookout_report::Dispatcher;
/// use lookout_transport::http::HttpTransport;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ConfigBuilder::new()
///     .endpoint("https://collector.example.com/report")
///     .app_id("shop-web")
///     .build();
/// let transport = Arc::new(HttpTransport::new(&config.report)?);
/// let dispatcher = Dispatcher::builder(config, transport).build()?;
///
/// let data = serde_json::json!({"message": "boom"});
/// dispatcher.report_error(data.as_object().cloned().unwrap_or_default());
/// dispatcher.destroy().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.inner.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Starts building a dispatcher around `config` and `transport`.
    pub fn builder(config: Config, transport: Arc<dyn IReportTransport>) -> DispatcherBuilder {
        DispatcherBuilder::new(config, transport)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Reports an error payload (category `"error"`).
    pub fn report_error(&self, data: Payload) -> Disposition {
        self.ingest(Category::Error, data)
    }

    /// Reports a performance payload (category `"performance"`).
    pub fn report_performance(&self, data: Payload) -> Disposition {
        self.ingest(Category::Performance, data)
    }

    fn ingest(&self, category: Category, data: Payload) -> Disposition {
        let inner = &self.inner;

        if inner.state().destroyed {
            debug!(%category, "Dispatcher destroyed, ignoring report");
            return Disposition::Closed;
        }

        let data = match &inner.sanitizer {
            Some(sanitizer) => sanitizer.sanitize(data),
            None => data,
        };

        if let Err(reason) = inner.filter.admit(category, &data) {
            debug!(%category, %reason, "Report not admitted");
            inner.observer.on_dropped(reason, 1);
            return match reason {
                DropReason::Sampled => Disposition::SampledOut,
                _ => Disposition::Filtered,
            };
        }

        let mut payload = data;
        inner.stamp.apply(&mut payload, category);

        let Some(payload) = apply_hook(inner.hook.as_ref(), payload) else {
            debug!(%category, "Report vetoed by before-report hook");
            inner.observer.on_dropped(DropReason::Vetoed, 1);
            return Disposition::Vetoed;
        };

        if category == Category::Error && !inner.integrations.is_empty() {
            inner.integrations.forward(&payload);
        }

        let item = ReportItem::new(payload);
        debug!(item_id = item.id(), %category, "Report accepted");
        inner.observer.on_queued(category);

        if inner.settings.batch_report {
            let (queued, offline) = {
                let mut state = inner.state();
                (state.queue.push(item), state.offline.len())
            };
            inner.observer.on_depth(queued, offline);
            if queued >= inner.settings.batch_size {
                debug!(queued, "Batch size reached, requesting flush");
                inner.flush_signal.notify_one();
            }
            Disposition::Queued
        } else {
            let inner = Arc::clone(inner);
            self.inner.runtime.spawn(async move {
                inner.deliver_single(item).await;
            });
            Disposition::Dispatched
        }
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Asks the scheduler to flush on its next turn.
    pub fn request_flush(&self) {
        self.inner.flush_signal.notify_one();
    }

    /// Sends up to `batch_size` items from the head of the queue
    ///
    /// A no-op while another flush is in flight or the queue is empty.
    /// Offline, the batch is moved to the offline buffer instead. On
    /// failure every item is charged one retry and the survivors go back
    /// to the head of the queue in their original order. A batch that
    /// fails after [`Dispatcher::destroy`] is dropped.
    pub async fn flush_batch(&self) -> FlushOutcome {
        let inner = &self.inner;

        let batch = {
            let mut state = inner.state();
            if state.sending || state.queue.is_empty() {
                return FlushOutcome::Skipped;
            }
            let batch = state.queue.take_front(inner.settings.batch_size);
            if !state.online {
                let count = batch.len();
                state.offline.extend(batch);
                drop(state);
                debug!(count, "Offline, moved batch to offline buffer");
                inner.observer.on_offlined(count);
                inner.publish_depth();
                return FlushOutcome::Offlined(count);
            }
            state.sending = true;
            batch
        };

        let count = batch.len();
        let delivered = inner.send_batch(&batch).await;

        let (outcome, remaining) = {
            let mut state = inner.state();
            state.sending = false;
            let outcome = if delivered {
                FlushOutcome::Delivered(count)
            } else if state.destroyed {
                drop(state);
                warn!(count, "Batch failed after teardown, dropping it");
                inner.observer.on_dropped(DropReason::Closed, count);
                return FlushOutcome::Failed {
                    retained: 0,
                    dropped: count,
                };
            } else {
                let settled = inner.retry.settle_failed_batch(batch);
                let retained = settled.retained.len();
                state.queue.requeue_front(settled.retained);
                FlushOutcome::Failed {
                    retained,
                    dropped: settled.dropped,
                }
            };
            (outcome, state.queue.len())
        };

        if let FlushOutcome::Failed { dropped, .. } = outcome {
            if dropped > 0 {
                inner.observer.on_dropped(DropReason::RetryBudget, dropped);
            }
        }
        inner.publish_depth();

        if remaining > 0 && inner.settings.eager_drain {
            debug!(remaining, "Items remain queued, requesting eager drain");
            inner.flush_signal.notify_one();
        }

        outcome
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// Applies an online/offline transition.
    pub fn set_online(&self, online: bool) {
        if online {
            self.handle_online();
        } else {
            self.handle_offline();
        }
    }

    fn handle_offline(&self) {
        self.inner.state().online = false;
        info!("Connectivity lost, new batches will be buffered");
    }

    fn handle_online(&self) {
        let inner = &self.inner;
        let replay = {
            let mut state = inner.state();
            state.online = true;
            state.offline.take_all()
        };
        info!(buffered = replay.len(), "Connectivity restored");
        if replay.is_empty() {
            return;
        }
        inner.observer.on_replayed(replay.len());

        if inner.settings.batch_report {
            inner.state().queue.requeue_front(replay);
            inner.publish_depth();
            inner.flush_signal.notify_one();
        } else {
            inner.publish_depth();
            for item in replay {
                let inner = Arc::clone(inner);
                self.inner.runtime.spawn(async move {
                    inner.deliver_single(item).await;
                });
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stops the scheduler and makes one best-effort delivery of the
    /// whole remaining queue as a single batch body
    ///
    /// The beacon path is preferred when `use_beacon` is set; otherwise,
    /// or when the beacon refuses the body, a confirmed POST is awaited
    /// once. In-flight requests are not cancelled. Idempotent.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        inner.shutdown.cancel();

        let (remaining, online) = {
            let mut state = inner.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (state.queue.drain_all(), state.online)
        };

        let count = remaining.len();
        info!(remaining = count, online, "Dispatcher tearing down");
        if count == 0 {
            return;
        }
        if !online {
            warn!(count, "Offline at teardown, discarding queued reports");
            return;
        }
        if !inner.settings.has_endpoint {
            send_log!(
                inner.settings.verbose,
                count,
                "Report endpoint is not configured, skipping final flush"
            );
            return;
        }

        let body = match serde_json::to_value(BatchEnvelope::new(&remaining)) {
            Ok(body) => body,
            Err(e) => {
                warn!(count, error = %e, "Failed to serialize final batch");
                return;
            }
        };

        if inner.settings.use_beacon
            && inner.transport.supports_beacon()
            && inner.transport.send_beacon(&body)
        {
            info!(count, "Final batch handed to beacon");
            inner.observer.on_delivered(DeliveryMode::Beacon, count);
            return;
        }

        match inner.transport.post(&body).await {
            Ok(()) => {
                info!(count, "Final batch delivered");
                inner.observer.on_delivered(DeliveryMode::Batch, count);
            }
            Err(e) => {
                warn!(count, error = %e, "Final batch delivery failed");
                inner.observer.on_failed(DeliveryMode::Batch, count);
            }
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn status(&self) -> DispatchStatus {
        let state = self.inner.state();
        DispatchStatus {
            queued: state.queue.len(),
            offline: state.offline.len(),
            sending: state.sending,
            online: state.online,
            destroyed: state.destroyed,
        }
    }

    /// Ids of the queued items in dispatch order
    pub fn queued_ids(&self) -> Vec<String> {
        self.inner.state().queue.ids()
    }

    /// Ids of the offline-buffered items, oldest first
    pub fn offline_ids(&self) -> Vec<String> {
        self.inner.state().offline.ids()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for [`Dispatcher`]
///
/// The hook, integrations, observer and connectivity source are supplied
/// programmatically; everything else comes from [`Config`].
pub struct DispatcherBuilder {
    config: Config,
    transport: Arc<dyn IReportTransport>,
    hook: Option<BeforeReport>,
    integrations: Vec<Arc<dyn IIntegration>>,
    observer: Arc<dyn IDispatchObserver>,
    sample_source: Option<SampleSource>,
    connectivity: Option<watch::Receiver<bool>>,
    sanitizer: Option<PayloadSanitizer>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    fn new(config: Config, transport: Arc<dyn IReportTransport>) -> Self {
        let sanitizer = Some(PayloadSanitizer::new(&config.sanitize));
        Self {
            config,
            transport,
            hook: None,
            integrations: Vec::new(),
            observer: Arc::new(NoopObserver),
            sample_source: None,
            connectivity: None,
            sanitizer,
            runtime: None,
        }
    }

    /// Sets the before-report hook.
    pub fn before_report<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Payload) -> HookDecision + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Registers an integration; it only runs if enabled in configuration.
    pub fn integration(mut self, integration: Arc<dyn IIntegration>) -> Self {
        self.integrations.push(integration);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn IDispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the random source used for sampling (useful for testing).
    pub fn sample_source(mut self, source: SampleSource) -> Self {
        self.sample_source = Some(source);
        self
    }

    /// Subscribes the dispatcher to online/offline transitions.
    pub fn connectivity(mut self, rx: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(rx);
        self
    }

    /// Replaces (or with `None`, disables) the ingestion sanitizer.
    pub fn sanitizer(mut self, sanitizer: Option<PayloadSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Spawns background tasks on `handle` instead of the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validates the configuration and starts the background tasks.
    ///
    /// # Errors
    /// - [`ReportError::InvalidConfig`] when the `report` or `sanitize`
    ///   sections fail validation
    /// - [`ReportError::DomainError`] for an out-of-range sample rate
    /// - [`ReportError::NoRuntime`] outside a tokio runtime
    pub fn build(self) -> Result<Dispatcher, ReportError> {
        let report = &self.config.report;

        let filter = match self.sample_source {
            Some(source) => ReportFilter::with_source(report.sample_rate, report.report_level, source)?,
            None => ReportFilter::new(report.sample_rate, report.report_level)?,
        };

        let problems: Vec<String> = self
            .config
            .validate()
            .into_iter()
            .filter(|e| e.field.starts_with("report.") || e.field.starts_with("sanitize."))
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ReportError::InvalidConfig(problems.join("; ")));
        }

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| ReportError::NoRuntime(e.to_string()))?,
        };

        let online = self
            .connectivity
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(true);

        let settings = Settings {
            batch_report: report.batch_report,
            batch_size: report.batch_size,
            use_beacon: report.use_beacon,
            has_endpoint: report.has_endpoint(),
            eager_drain: report.eager_drain,
            verbose: self.config.debug,
        };
        let batch_interval = report.batch_interval();

        let inner = Arc::new(Inner {
            settings,
            stamp: report.stamp(),
            filter,
            retry: RetryPolicy::from_config(report),
            sanitizer: self.sanitizer,
            hook: self.hook,
            integrations: IntegrationSet::new(report, self.integrations),
            transport: self.transport,
            observer: self.observer,
            state: Mutex::new(DispatchState {
                queue: DispatchQueue::new(),
                offline: OfflineBuffer::new(),
                sending: false,
                online,
                destroyed: false,
            }),
            flush_signal: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            runtime: runtime.clone(),
        });

        if inner.settings.batch_report {
            let scheduler = BatchScheduler::new(
                batch_interval,
                Arc::clone(&inner.flush_signal),
                inner.shutdown.clone(),
            );
            let weak = Arc::downgrade(&inner);
            runtime.spawn(scheduler.run(move |_trigger| {
                weak.upgrade().map(|inner| async move {
                    Dispatcher { inner }.flush_batch().await;
                })
            }));
        }

        if let Some(rx) = self.connectivity {
            let weak = Arc::downgrade(&inner);
            runtime.spawn(watch_connectivity(
                rx,
                inner.shutdown.clone(),
                move |online| {
                    weak.upgrade().map(|inner| async move {
                        Dispatcher { inner }.set_online(online);
                    })
                },
            ));
        }

        info!(
            batch_report = inner.settings.batch_report,
            batch_size = inner.settings.batch_size,
            batch_interval_ms = batch_interval.as_millis() as u64,
            endpoint_configured = inner.settings.has_endpoint,
            integrations = inner.integrations.len(),
            online,
            "Dispatcher started"
        );

        Ok(Dispatcher { inner })
    }
}

// ============================================================================
// Unit tests
// ============================================================================
