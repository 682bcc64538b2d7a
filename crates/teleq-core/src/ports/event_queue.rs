//! Event queue port (driven/secondary port)
//!
//! This module defines the interface for the durable telemetry queue that
//! producers write to and the flush pipeline drains.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - `dequeue` is a read-only peek. Records leave the queue only through
//!   `mark_sent`, `mark_failed` (once retries are exhausted) or `prune`.
//! - The queue never interprets payloads or event types; it only orders
//!   by priority, then creation time, then id.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

use crate::domain::{EventId, EventInput, EventRecord, Priority, QueueStats};

// ============================================================================
// Reports
// ============================================================================

/// Result of a `mark_failed` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkFailedOutcome {
    /// Records whose retry counter was incremented and that remain queued
    pub retried: u64,
    /// Records deleted because they reached the retry cap
    pub dropped: u64,
}

/// Result of a `prune` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Records deleted for exceeding the maximum age
    pub expired: u64,
    /// Records deleted to bring the queue back under its size cap
    pub evicted: u64,
}

impl PruneReport {
    /// Total number of records removed
    #[must_use]
    pub fn total(&self) -> u64 {
        self.expired + self.evicted
    }
}

// ============================================================================
// QueueSignals
// ============================================================================

/// Wake-ups raised by the queue for the background flush worker
///
/// Each signal stores at most one pending permit, so bursts of enqueues
/// collapse into a single wake-up. Clones share the same underlying
/// notifiers.
#[derive(Debug, Clone, Default)]
pub struct QueueSignals {
    critical: Arc<Notify>,
    prune: Arc<Notify>,
}

impl QueueSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raised after a `Critical` record was committed
    pub fn notify_critical(&self) {
        self.critical.notify_one();
    }

    /// Raised when an insert left the queue over its size or age limit
    pub fn notify_prune_needed(&self) {
        self.prune.notify_one();
    }

    /// Wait until a `Critical` record is enqueued
    pub async fn critical_enqueued(&self) {
        self.critical.notified().await;
    }

    /// Wait until the queue asks to be pruned
    pub async fn prune_needed(&self) {
        self.prune.notified().await;
    }
}

// ============================================================================
// IEventQueue trait
// ============================================================================

/// Port trait for the durable telemetry event queue
///
/// ## Implementation Notes
///
/// - `enqueue` and `enqueue_batch` must be safe to call concurrently; ids
///   are assigned in the order writers acquire the store's write lock.
/// - `enqueue_batch` is all or nothing.
/// - Ordering for `dequeue` is `(priority DESC, created_at ASC, id ASC)`.
/// - Rows that cannot be decoded are skipped by reads and counted in
///   [`QueueStats::corrupt_skipped`], never returned as errors.
#[async_trait::async_trait]
pub trait IEventQueue: Send + Sync {
    /// Persists one event and returns its assigned id
    async fn enqueue(&self, input: EventInput) -> anyhow::Result<EventId>;

    /// Persists several events in a single transaction
    ///
    /// Returned ids follow the order of `inputs`.
    async fn enqueue_batch(&self, inputs: Vec<EventInput>) -> anyhow::Result<Vec<EventId>>;

    /// Returns up to `limit` records in dequeue order without removing them
    async fn dequeue(&self, limit: u32) -> anyhow::Result<Vec<EventRecord>>;

    /// Like [`IEventQueue::dequeue`] but only considers records with at
    /// least `min_priority`
    async fn dequeue_at_least(
        &self,
        limit: u32,
        min_priority: Priority,
    ) -> anyhow::Result<Vec<EventRecord>>;

    /// Deletes the given records; unknown ids are ignored
    ///
    /// Returns the number of rows actually removed.
    async fn mark_sent(&self, ids: &[EventId]) -> anyhow::Result<u64>;

    /// Increments the retry counter of the given records and deletes those
    /// that reached the retry cap
    async fn mark_failed(&self, ids: &[EventId]) -> anyhow::Result<MarkFailedOutcome>;

    /// Applies the retention policy: age first, then size
    async fn prune(&self) -> anyhow::Result<PruneReport>;

    /// Computes a diagnostic snapshot of the queue
    async fn stats(&self) -> anyhow::Result<QueueStats>;

    /// Whether at least one record with `min_priority` or higher is queued
    async fn has_pending(&self, min_priority: Priority) -> anyhow::Result<bool>;

    /// Signals shared with the flush worker
    fn signals(&self) -> QueueSignals;
}
