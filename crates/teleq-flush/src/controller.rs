//! Flush controller - one dequeue, upload and reconcile cycle
//!
//! The [`FlushController`] is the only component that talks to the
//! [`IUploader`]. Each call to [`run_cycle`](FlushController::run_cycle):
//!
//! 1. Evaluates the current [`TelemetryMode`]; skips when offline, or in
//!    `Minimal` mode when no `Critical` record is pending
//! 2. Dequeues a mode-dependent batch (non-destructive)
//! 3. Groups the batch by event type, preserving first-seen order
//! 4. Uploads each group under a timeout
//! 5. Marks successful groups as sent and failed or timed-out groups as
//!    failed
//!
//! A failing group never prevents the remaining groups from being
//! uploaded, and no group is retried within the same cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use teleq_core::config::FlushConfig;
use teleq_core::domain::{EventId, EventRecord, EventType, Priority, TelemetryMode};
use teleq_core::ports::{IEventQueue, IUploader, PruneReport, UploadError};

use crate::metrics::QueueMetrics;
use crate::monitor::ResourceMonitor;

// ============================================================================
// FlushTrigger / SkipReason
// ============================================================================

/// What caused a flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// Periodic timer for the current mode
    Timer,
    /// A `Critical` record was enqueued
    Critical,
    /// Connectivity went from offline to online
    ConnectivityRestored,
    /// The app is moving to the background
    Background,
    /// The app returned to the foreground
    Foreground,
    /// Explicit request through the flush handle or a tool
    Manual,
}

impl FlushTrigger {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Timer => "timer",
            FlushTrigger::Critical => "critical",
            FlushTrigger::ConnectivityRestored => "connectivity_restored",
            FlushTrigger::Background => "background",
            FlushTrigger::Foreground => "foreground",
            FlushTrigger::Manual => "manual",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle ended without uploading anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No network connectivity
    Offline,
    /// `Minimal` mode and no `Critical` record pending
    MinimalNoCritical,
    /// Nothing eligible to upload
    Empty,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Offline => "offline",
            SkipReason::MinimalNoCritical => "minimal",
            SkipReason::Empty => "empty",
        }
    }
}

// ============================================================================
// FlushReport
// ============================================================================

/// Summary of one flush cycle
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub mode: TelemetryMode,
    /// Set when the cycle did not attempt any upload
    pub skipped: Option<SkipReason>,
    /// Records returned by the dequeue
    pub dequeued: usize,
    /// Number of event-type groups uploaded
    pub groups: usize,
    /// Records deleted after a successful upload
    pub sent: u64,
    /// Records that failed and remain queued
    pub retried: u64,
    /// Records that failed and reached the retry cap
    pub dropped: u64,
    /// Upload and storage errors (non-fatal)
    pub errors: Vec<String>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

impl FlushReport {
    fn new(trigger: FlushTrigger, mode: TelemetryMode) -> Self {
        Self {
            trigger,
            mode,
            skipped: None,
            dequeued: 0,
            groups: 0,
            sent: 0,
            retried: 0,
            dropped: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Label for metrics: the skip reason, `ok`, or `failed`
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self.skipped {
            Some(reason) => reason.as_str(),
            None if self.errors.is_empty() => "ok",
            None => "failed",
        }
    }
}

// ============================================================================
// FlushOptions
// ============================================================================

/// Tunables for a flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOptions {
    /// Records requested per cycle in `Full` and `Normal` mode
    pub batch_size: u32,
    /// Upper bound for one uploader call
    pub upload_timeout: Duration,
}

impl FlushOptions {
    pub fn from_config(config: &FlushConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            upload_timeout: config.upload_timeout(),
        }
    }
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self::from_config(&FlushConfig::default())
    }
}

/// How one group upload ended
enum GroupOutcome {
    Sent,
    Failed(UploadError),
    TimedOut,
}

impl GroupOutcome {
    fn label(&self) -> &'static str {
        match self {
            GroupOutcome::Sent => "ok",
            GroupOutcome::Failed(e) => e.kind(),
            GroupOutcome::TimedOut => "timeout",
        }
    }
}

// ============================================================================
// FlushController
// ============================================================================

/// Runs flush cycles against a queue and an uploader
pub struct FlushController {
    queue: Arc<dyn IEventQueue>,
    uploader: Arc<dyn IUploader>,
    monitor: ResourceMonitor,
    options: FlushOptions,
    metrics: Option<Arc<QueueMetrics>>,
}

impl FlushController {
    pub fn new(
        queue: Arc<dyn IEventQueue>,
        uploader: Arc<dyn IUploader>,
        monitor: ResourceMonitor,
        options: FlushOptions,
    ) -> Self {
        Self {
            queue,
            uploader,
            monitor,
            options,
            metrics: None,
        }
    }

    /// Record cycle, upload and drop metrics into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<QueueMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &Arc<dyn IEventQueue> {
        &self.queue
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn options(&self) -> &FlushOptions {
        &self.options
    }

    /// Runs one flush cycle
    ///
    /// Never fails: upload and storage errors are logged and collected in
    /// [`FlushReport::errors`]. Records stay queued unless an upload was
    /// acknowledged or their retries ran out.
    pub async fn run_cycle(&self, trigger: FlushTrigger) -> FlushReport {
        let start = Instant::now();
        let snapshot = self.monitor.evaluate();
        let mut report = FlushReport::new(trigger, snapshot.mode);

        if let Some(reason) = self.cycle_inner(&mut report, snapshot.online).await {
            report.skipped = Some(reason);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        match report.skipped {
            Some(reason) => debug!(
                trigger = %trigger,
                mode = %report.mode,
                reason = reason.as_str(),
                "Flush cycle skipped"
            ),
            None => info!(
                trigger = %trigger,
                mode = %report.mode,
                groups = report.groups,
                sent = report.sent,
                retried = report.retried,
                dropped = report.dropped,
                errors = report.errors.len(),
                duration_ms = report.duration_ms,
                "Flush cycle completed"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(trigger.as_str(), report.outcome());
            metrics.record_dropped("retries_exhausted", report.dropped);
            if report.skipped.is_none() {
                self.refresh_depth(metrics).await;
            }
        }

        report
    }

    /// Returns `Some(reason)` if the cycle was skipped
    async fn cycle_inner(&self, report: &mut FlushReport, online: bool) -> Option<SkipReason> {
        if !online {
            return Some(SkipReason::Offline);
        }

        let batch = match self.dequeue_for_mode(report.mode).await {
            Ok(Some(batch)) => batch,
            Ok(None) => return Some(SkipReason::MinimalNoCritical),
            Err(e) => {
                error!(error = %e, "Failed to dequeue events");
                report.errors.push(format!("dequeue: {e:#}"));
                return None;
            }
        };

        if batch.is_empty() {
            return Some(SkipReason::Empty);
        }
        report.dequeued = batch.len();

        let groups = group_by_type(batch);
        report.groups = groups.len();

        for (event_type, records) in groups {
            self.flush_group(&event_type, &records, report).await;
        }

        None
    }

    /// Dequeues the batch allowed by `mode`
    ///
    /// Returns `Ok(None)` for the `Minimal` short-circuit.
    async fn dequeue_for_mode(
        &self,
        mode: TelemetryMode,
    ) -> anyhow::Result<Option<Vec<EventRecord>>> {
        let limit = mode.batch_limit(self.options.batch_size);
        let min_priority = mode.min_priority();

        if min_priority == Priority::Low {
            return Ok(Some(self.queue.dequeue(limit).await?));
        }

        if !self.queue.has_pending(min_priority).await? {
            return Ok(None);
        }
        Ok(Some(self.queue.dequeue_at_least(limit, min_priority).await?))
    }

    /// Uploads one group and reconciles the result into the queue
    async fn flush_group(
        &self,
        event_type: &EventType,
        records: &[EventRecord],
        report: &mut FlushReport,
    ) {
        let ids: Vec<EventId> = records.iter().map(EventRecord::id).collect();
        let count = ids.len() as u64;

        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.options.upload_timeout,
            self.uploader.upload(event_type, records),
        )
        .await
        {
            Ok(Ok(())) => GroupOutcome::Sent,
            Ok(Err(e)) => GroupOutcome::Failed(e),
            Err(_) => GroupOutcome::TimedOut,
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_upload(outcome.label(), started.elapsed().as_secs_f64());
        }

        match outcome {
            GroupOutcome::Sent => match self.queue.mark_sent(&ids).await {
                Ok(removed) => {
                    debug!(event_type = %event_type, count, "Group uploaded");
                    report.sent += removed;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_uploaded(event_type.as_str(), count);
                    }
                }
                Err(e) => {
                    // The records will be uploaded again next cycle
                    error!(event_type = %event_type, error = %e, "Failed to mark events as sent");
                    report.errors.push(format!("mark_sent {event_type}: {e:#}"));
                }
            },
            failed => {
                let reason = failed.label();
                let message = match &failed {
                    GroupOutcome::Failed(e) => e.to_string(),
                    _ => format!(
                        "Upload timed out after {}s",
                        self.options.upload_timeout.as_secs_f64()
                    ),
                };
                warn!(event_type = %event_type, count, reason, error = %message, "Group upload failed");
                report.errors.push(format!("{event_type}: {message}"));
                if let Some(metrics) = &self.metrics {
                    metrics.record_failed(event_type.as_str(), reason, count);
                }

                match self.queue.mark_failed(&ids).await {
                    Ok(result) => {
                        report.retried += result.retried;
                        report.dropped += result.dropped;
                    }
                    Err(e) => {
                        error!(event_type = %event_type, error = %e, "Failed to mark events as failed");
                        report.errors.push(format!("mark_failed {event_type}: {e:#}"));
                    }
                }
            }
        }
    }

    /// Applies the queue's retention policy
    ///
    /// Errors are logged and reported as `None`.
    pub async fn prune(&self, reason: &str) -> Option<PruneReport> {
        match self.queue.prune().await {
            Ok(report) => {
                debug!(
                    reason,
                    expired = report.expired,
                    evicted = report.evicted,
                    "Prune completed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_dropped("expired", report.expired);
                    metrics.record_dropped("evicted", report.evicted);
                    self.refresh_depth(metrics).await;
                }
                Some(report)
            }
            Err(e) => {
                error!(reason, error = %e, "Prune failed");
                None
            }
        }
    }

    async fn refresh_depth(&self, metrics: &QueueMetrics) {
        match self.queue.stats().await {
            Ok(stats) => metrics.set_queue_depth(stats.total_count),
            Err(e) => debug!(error = %e, "Could not refresh queue depth"),
        }
    }
}

/// Groups records by event type, keeping the order in which types first
/// appear and the dequeue order within each group
fn group_by_type(records: Vec<EventRecord>) -> Vec<(EventType, Vec<EventRecord>)> {
    let mut index: HashMap<EventType, usize> = HashMap::new();
    let mut groups: Vec<(EventType, Vec<EventRecord>)> = Vec::new();

    for record in records {
        match index.get(record.event_type()) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(record.event_type().clone(), groups.len());
                groups.push((record.event_type().clone(), vec![record]));
            }
        }
    }

    groups
}
