//! Prometheus metrics registry for the flush pipeline
//!
//! Provides typed, labeled counters, gauges, and histograms for flush
//! cycles, uploads, drops and queue depth.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct QueueMetrics {
    registry: Registry,
    /// Counter: flush cycles by (trigger, outcome)
    pub flush_cycles_total: IntCounterVec,
    /// Counter: events acknowledged by the uploader, by event type
    pub events_uploaded_total: IntCounterVec,
    /// Counter: events whose upload failed, by (event_type, reason)
    pub events_failed_total: IntCounterVec,
    /// Counter: events removed without delivery, by reason
    pub events_dropped_total: IntCounterVec,
    /// Gauge: rows currently stored
    pub queue_depth: IntGauge,
    /// Histogram: uploader call duration in seconds
    pub upload_duration_seconds: HistogramVec,
}

impl QueueMetrics {
    /// Creates a new `QueueMetrics` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("teleq".to_string()), None)?;

        let flush_cycles_total = IntCounterVec::new(
            Opts::new("flush_cycles_total", "Total flush cycles"),
            &["trigger", "outcome"],
        )?;
        registry.register(Box::new(flush_cycles_total.clone()))?;

        let events_uploaded_total = IntCounterVec::new(
            Opts::new("events_uploaded_total", "Events acknowledged by the backend"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_uploaded_total.clone()))?;

        let events_failed_total = IntCounterVec::new(
            Opts::new("events_failed_total", "Events whose upload attempt failed"),
            &["event_type", "reason"],
        )?;
        registry.register(Box::new(events_failed_total.clone()))?;

        let events_dropped_total = IntCounterVec::new(
            Opts::new("events_dropped_total", "Events removed without delivery"),
            &["reason"],
        )?;
        registry.register(Box::new(events_dropped_total.clone()))?;

        let queue_depth = IntGauge::new("queue_depth", "Events currently stored")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let upload_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "upload_duration_seconds",
                "Uploader call duration in seconds",
            )
            .buckets(vec![0.05, 0.25, 1.0, 5.0, 10.0, f64::INFINITY]),
            &["result"],
        )?;
        registry.register(Box::new(upload_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            flush_cycles_total,
            events_uploaded_total,
            events_failed_total,
            events_dropped_total,
            queue_depth,
            upload_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_cycle(&self, trigger: &str, outcome: &str) {
        self.flush_cycles_total
            .with_label_values(&[trigger, outcome])
            .inc();
    }

    pub fn record_uploaded(&self, event_type: &str, count: u64) {
        self.events_uploaded_total
            .with_label_values(&[event_type])
            .inc_by(count);
    }

    /// `reason` is `transient`, `permanent` or `timeout`.
    pub fn record_failed(&self, event_type: &str, reason: &str, count: u64) {
        self.events_failed_total
            .with_label_values(&[event_type, reason])
            .inc_by(count);
    }

    /// `reason` is `retries_exhausted`, `expired` or `evicted`.
    pub fn record_dropped(&self, reason: &str, count: u64) {
        if count > 0 {
            self.events_dropped_total
                .with_label_values(&[reason])
                .inc_by(count);
        }
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    pub fn observe_upload(&self, result: &str, duration_secs: f64) {
        self.upload_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
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
