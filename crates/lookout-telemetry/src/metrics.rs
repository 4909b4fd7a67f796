//! Prometheus metrics registry for Lookout
//!
//! Provides labeled counters, gauges and a histogram covering every
//! dispatcher lifecycle event. [`MetricsRegistry`] implements
//! [`IDispatchObserver`] so it can be handed straight to the dispatcher
//! builder.

use lookout_core::domain::Category;
use lookout_core::ports::{DeliveryMode, DropReason, IDispatchObserver};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: reports accepted for delivery by category
    pub reports_queued_total: IntCounterVec,
    /// Counter: delivery attempts by (mode, result)
    pub deliveries_total: IntCounterVec,
    /// Counter: items handed off successfully by mode
    pub items_delivered_total: IntCounterVec,
    /// Counter: reports dropped by reason
    pub reports_dropped_total: IntCounterVec,
    /// Counter: items moved to the offline buffer
    pub offline_buffered_total: IntCounter,
    /// Counter: items replayed after reconnecting
    pub replayed_total: IntCounter,
    /// Gauge: current dispatch queue depth
    pub queue_depth: IntGauge,
    /// Gauge: current offline buffer depth
    pub offline_depth: IntGauge,
    /// Histogram: items per successful batch delivery
    pub batch_items: Histogram,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("lookout".to_string()), None)?;

        let reports_queued_total = IntCounterVec::new(
            Opts::new("reports_queued_total", "Reports accepted for delivery"),
            &["category"],
        )?;
        registry.register(Box::new(reports_queued_total.clone()))?;

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Delivery attempts by mode and result"),
            &["mode", "result"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let items_delivered_total = IntCounterVec::new(
            Opts::new("items_delivered_total", "Items handed off successfully"),
            &["mode"],
        )?;
        registry.register(Box::new(items_delivered_total.clone()))?;

        let reports_dropped_total = IntCounterVec::new(
            Opts::new("reports_dropped_total", "Reports dropped before delivery"),
            &["reason"],
        )?;
        registry.register(Box::new(reports_dropped_total.clone()))?;

        let offline_buffered_total = IntCounter::new(
            "offline_buffered_total",
            "Items moved to the offline buffer",
        )?;
        registry.register(Box::new(offline_buffered_total.clone()))?;

        let replayed_total =
            IntCounter::new("replayed_total", "Items replayed after reconnecting")?;
        registry.register(Box::new(replayed_total.clone()))?;

        let queue_depth = IntGauge::new("queue_depth", "Items waiting in the dispatch queue")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let offline_depth = IntGauge::new("offline_depth", "Items waiting in the offline buffer")?;
        registry.register(Box::new(offline_depth.clone()))?;

        let batch_items = Histogram::with_opts(
            HistogramOpts::new("batch_items", "Items per delivered batch")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(batch_items.clone()))?;

        Ok(Self {
            registry,
            reports_queued_total,
            deliveries_total,
            items_delivered_total,
            reports_dropped_total,
            offline_buffered_total,
            replayed_total,
            queue_depth,
            offline_depth,
            batch_items,
        })
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl IDispatchObserver for MetricsRegistry {
    fn on_queued(&self, category: Category) {
        self.reports_queued_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    fn on_delivered(&self, mode: DeliveryMode, count: usize) {
        self.deliveries_total
            .with_label_values(&[mode.as_str(), "success"])
            .inc();
        self.items_delivered_total
            .with_label_values(&[mode.as_str()])
            .inc_by(count as u64);
        if mode == DeliveryMode::Batch {
            self.batch_items.observe(count as f64);
        }
    }

    fn on_failed(&self, mode: DeliveryMode, _count: usize) {
        self.deliveries_total
            .with_label_values(&[mode.as_str(), "failure"])
            .inc();
    }

    fn on_dropped(&self, reason: DropReason, count: usize) {
        self.reports_dropped_total
            .with_label_values(&[reason.as_str()])
            .inc_by(count as u64);
    }

    fn on_offlined(&self, count: usize) {
        self.offline_buffered_total.inc_by(count as u64);
    }

    fn on_replayed(&self, count: usize) {
        self.replayed_total.inc_by(count as u64);
    }

    fn on_depth(&self, queued: usize, offline: usize) {
        self.queue_depth.set(queued as i64);
        self.offline_depth.set(offline as i64);
    }
}
