//! SQLite implementation of IEventQueue
//!
//! This module provides the concrete SQLite-based implementation of the
//! event queue port defined in teleq-core. It handles row decoding, the
//! writer lock that orders inserts, and the retention queries.
//!
//! ## Type Mapping
//!
//! | Domain Type   | SQL Type | Strategy                                      |
//! |---------------|----------|-----------------------------------------------|
//! | EventId       | INTEGER  | `AUTOINCREMENT` rowid, never reused           |
//! | EventType     | TEXT     | `.as_str()` / `EventType::new()`              |
//! | payload       | BLOB     | stored byte for byte                          |
//! | DateTime<Utc> | INTEGER  | epoch millis, clamped to be non-decreasing    |
//! | Priority      | INTEGER  | `Priority::rank()` / `Priority::from_rank()`  |
//!
//! ## Corrupt rows
//!
//! A row whose columns cannot be decoded (unknown priority rank, wrong
//! storage class, invalid type tag) is skipped by every read, counted, and
//! logged at `warn`. It is never returned and never aborts the read.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use teleq_core::domain::{
    EventId, EventInput, EventRecord, EventType, Priority, QueueStats, RetentionPolicy,
};
use teleq_core::ports::{IEventQueue, MarkFailedOutcome, PruneReport, QueueSignals};

use crate::CacheError;

/// Maximum number of bound ids per statement
///
/// Older SQLite builds cap host parameters at 999.
const ID_CHUNK_SIZE: usize = 500;

const SELECT_COLUMNS: &str = "id, type, payload, created_at, retry_count, priority";

/// SQLite-based implementation of the event queue port
///
/// Inserts are serialized by an async writer lock so that id and
/// `created_at` assignment follow lock acquisition order. Reads and
/// deletions go straight to the pool; WAL mode gives readers a consistent
/// snapshot.
pub struct SqliteEventQueue {
    pool: SqlitePool,
    policy: RetentionPolicy,
    /// Last assigned `created_at` in epoch millis, loaded lazily
    writer: Mutex<Option<i64>>,
    signals: QueueSignals,
    corrupt_skipped: AtomicU64,
}

impl SqliteEventQueue {
    /// Creates a new queue over the given connection pool
    pub fn new(pool: SqlitePool, policy: RetentionPolicy) -> Self {
        Self {
            pool,
            policy,
            writer: Mutex::new(None),
            signals: QueueSignals::new(),
            corrupt_skipped: AtomicU64::new(0),
        }
    }

    /// Retention limits this queue enforces
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Undecodable rows skipped by reads since this queue was created
    pub fn corrupt_skipped(&self) -> u64 {
        self.corrupt_skipped.load(Ordering::Relaxed)
    }

    /// Inserts all `inputs` in one transaction while holding the writer lock
    async fn insert_all(&self, inputs: &[EventInput]) -> Result<Vec<EventId>, CacheError> {
        let mut last_created = self.writer.lock().await;

        let now = Utc::now().timestamp_millis();
        let floor = match *last_created {
            Some(ms) => ms,
            // Stored rows stamped ahead of the clock must not drag new
            // records into the future, past their expiry
            None => sqlx::query_scalar::<_, Option<i64>>(
                "SELECT MAX(created_at) FROM events WHERE typeof(created_at) = 'integer'",
            )
            .fetch_one(&self.pool)
            .await?
            .map_or(i64::MIN, |max| max.min(now)),
        };
        let created_at = now.max(floor);

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = sqlx::query(
                "INSERT INTO events (type, payload, created_at, retry_count, priority) \
                 VALUES (?, ?, ?, 0, ?)",
            )
            .bind(input.event_type.as_str())
            .bind(input.payload.as_slice())
            .bind(created_at)
            .bind(input.priority.rank())
            .execute(&mut *tx)
            .await?;
            ids.push(EventId::new(result.last_insert_rowid())?);
        }
        tx.commit().await?;

        *last_created = Some(created_at);
        Ok(ids)
    }

    /// Raises worker signals after a committed insert
    ///
    /// The limit check is advisory: a failing query is logged and the
    /// enqueue still succeeds.
    async fn signal_after_insert(&self, inputs: &[EventInput]) {
        if inputs.iter().any(|i| i.priority == Priority::Critical) {
            self.signals.notify_critical();
        }

        match self.exceeds_limits().await {
            Ok(true) => {
                tracing::debug!("Queue exceeds retention limits, requesting prune");
                self.signals.notify_prune_needed();
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to check queue limits"),
        }
    }

    async fn exceeds_limits(&self) -> Result<bool, CacheError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             MIN(CASE WHEN typeof(created_at) = 'integer' THEN created_at END) AS oldest \
             FROM events",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let oldest: Option<i64> = row.try_get("oldest")?;

        let cutoff = self.policy.expiry_cutoff(Utc::now()).timestamp_millis();
        Ok(to_u64(total) > self.policy.max_queue_size || oldest.is_some_and(|ms| ms < cutoff))
    }

    /// Reads up to `limit` decodable records at or above `min_priority`
    ///
    /// Corrupt rows do not consume the limit: the read pages forward until
    /// `limit` good records are collected or the table is exhausted.
    async fn fetch_ordered(
        &self,
        limit: u32,
        min_priority: Priority,
    ) -> Result<Vec<EventRecord>, CacheError> {
        let limit = limit as usize;
        let mut records = Vec::with_capacity(limit.min(1024));
        let mut offset: i64 = 0;

        while records.len() < limit {
            let want = limit - records.len();
            let rows = sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM events WHERE priority >= ? \
                 ORDER BY priority DESC, created_at ASC, id ASC LIMIT ? OFFSET ?"
            ))
            .bind(min_priority.rank())
            .bind(want as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

            let fetched = rows.len();
            for row in &rows {
                if let Some(record) = self.decode_or_skip(row) {
                    records.push(record);
                }
            }

            if fetched < want {
                break;
            }
            offset += fetched as i64;
        }

        Ok(records)
    }

    fn decode_or_skip(&self, row: &SqliteRow) -> Option<EventRecord> {
        match record_from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                self.corrupt_skipped.fetch_add(1, Ordering::Relaxed);
                let id: Option<i64> = row.try_get("id").ok();
                tracing::warn!(row_id = ?id, error = %e, "Skipping corrupt event row");
                None
            }
        }
    }

    async fn delete_ids(&self, ids: &[EventId]) -> Result<u64, CacheError> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let sql = format!(
                "DELETE FROM events WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            removed += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn fail_ids(&self, ids: &[EventId]) -> Result<MarkFailedOutcome, CacheError> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Ok(MarkFailedOutcome::default());
        }

        let max_retries = i64::from(self.policy.max_retries);
        let mut tx = self.pool.begin().await?;
        let mut touched = 0;
        let mut dropped = 0;
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let list = placeholders(chunk.len());

            let sql = format!("UPDATE events SET retry_count = retry_count + 1 WHERE id IN ({list})");
            let mut update = sqlx::query(&sql);
            for id in chunk {
                update = update.bind(*id);
            }
            touched += update.execute(&mut *tx).await?.rows_affected();

            let sql = format!("DELETE FROM events WHERE id IN ({list}) AND retry_count >= ?");
            let mut delete = sqlx::query(&sql);
            for id in chunk {
                delete = delete.bind(*id);
            }
            dropped += delete
                .bind(max_retries)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(MarkFailedOutcome {
            retried: touched.saturating_sub(dropped),
            dropped,
        })
    }

    async fn prune_inner(&self) -> Result<PruneReport, CacheError> {
        let cutoff = self.policy.expiry_cutoff(Utc::now()).timestamp_millis();
        let cap = i64::try_from(self.policy.max_queue_size).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query("DELETE FROM events WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&mut *tx)
            .await?;

        let evicted = if total > cap {
            sqlx::query(
                "DELETE FROM events WHERE id IN (\
                 SELECT id FROM events ORDER BY priority ASC, created_at ASC, id ASC LIMIT ?)",
            )
            .bind(total - cap)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            0
        };

        tx.commit().await?;
        Ok(PruneReport { expired, evicted })
    }

    async fn stats_inner(&self) -> Result<QueueStats, CacheError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             MIN(CASE WHEN typeof(created_at) = 'integer' THEN created_at END) AS oldest \
             FROM events",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let oldest: Option<i64> = row.try_get("oldest")?;

        let mut count_by_type = BTreeMap::new();
        let rows = sqlx::query("SELECT type, COUNT(*) AS n FROM events GROUP BY type")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            // Non-text type values are corrupt rows; they still count toward the total
            if let Ok(event_type) = row.try_get::<String, _>("type") {
                count_by_type.insert(event_type, to_u64(row.try_get("n")?));
            }
        }

        let mut count_by_priority = BTreeMap::new();
        let rows = sqlx::query("SELECT priority, COUNT(*) AS n FROM events GROUP BY priority")
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            let priority = row
                .try_get::<i64, _>("priority")
                .ok()
                .and_then(|rank| Priority::from_rank(rank).ok());
            if let Some(priority) = priority {
                count_by_priority.insert(priority, to_u64(row.try_get("n")?));
            }
        }

        Ok(QueueStats {
            total_count: to_u64(total),
            oldest_created_at: oldest.and_then(DateTime::<Utc>::from_timestamp_millis),
            count_by_type,
            count_by_priority,
            corrupt_skipped: self.corrupt_skipped(),
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Reconstruct an EventRecord from a database row
fn record_from_row(row: &SqliteRow) -> Result<EventRecord, CacheError> {
    let id: i64 = row.try_get("id")?;
    let event_type: String = row.try_get("type")?;
    let payload: Vec<u8> = row.try_get("payload")?;
    let created_at_ms: i64 = row.try_get("created_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let rank: i64 = row.try_get("priority")?;

    let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
        CacheError::SerializationError(format!("Timestamp out of range: {created_at_ms}"))
    })?;
    let retry_count = u32::try_from(retry_count).map_err(|_| {
        CacheError::SerializationError(format!("Invalid retry count: {retry_count}"))
    })?;

    Ok(EventRecord::restore(
        EventId::new(id)?,
        EventType::new(event_type)?,
        payload,
        created_at,
        retry_count,
        Priority::from_rank(rank)?,
    ))
}

/// `?, ?, ?` with `n` placeholders
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn dedup_ids(ids: &[EventId]) -> Vec<i64> {
    let mut raw: Vec<i64> = ids.iter().map(EventId::as_i64).collect();
    raw.sort_unstable();
    raw.dedup();
    raw
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

// ============================================================================
// IEventQueue implementation
// ============================================================================

#[async_trait::async_trait]
impl IEventQueue for SqliteEventQueue {
    async fn enqueue(&self, input: EventInput) -> anyhow::Result<EventId> {
        let inputs = [input];
        let ids = self.insert_all(&inputs).await.map_err(|e| {
            tracing::error!(event_type = %inputs[0].event_type, error = %e, "Failed to enqueue event");
            e
        })?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::QueryFailed("Insert returned no id".to_string()))?;

        tracing::trace!(
            event_id = %id,
            event_type = %inputs[0].event_type,
            priority = %inputs[0].priority,
            "Enqueued event"
        );
        self.signal_after_insert(&inputs).await;
        Ok(id)
    }

    async fn enqueue_batch(&self, inputs: Vec<EventInput>) -> anyhow::Result<Vec<EventId>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.insert_all(&inputs).await.map_err(|e| {
            tracing::error!(count = inputs.len(), error = %e, "Failed to enqueue batch");
            e
        })?;

        tracing::debug!(count = ids.len(), "Enqueued event batch");
        self.signal_after_insert(&inputs).await;
        Ok(ids)
    }

    async fn dequeue(&self, limit: u32) -> anyhow::Result<Vec<EventRecord>> {
        Ok(self.fetch_ordered(limit, Priority::Low).await?)
    }

    async fn dequeue_at_least(
        &self,
        limit: u32,
        min_priority: Priority,
    ) -> anyhow::Result<Vec<EventRecord>> {
        Ok(self.fetch_ordered(limit, min_priority).await?)
    }

    async fn mark_sent(&self, ids: &[EventId]) -> anyhow::Result<u64> {
        let removed = self.delete_ids(ids).await?;
        tracing::debug!(requested = ids.len(), removed, "Marked events as sent");
        Ok(removed)
    }

    async fn mark_failed(&self, ids: &[EventId]) -> anyhow::Result<MarkFailedOutcome> {
        let outcome = self.fail_ids(ids).await?;
        if outcome.dropped > 0 {
            tracing::warn!(
                dropped = outcome.dropped,
                max_retries = self.policy.max_retries,
                "Dropped events after exhausting retries"
            );
        }
        tracing::debug!(retried = outcome.retried, "Marked events as failed");
        Ok(outcome)
    }

    async fn prune(&self) -> anyhow::Result<PruneReport> {
        let report = self.prune_inner().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to prune event queue");
            e
        })?;
        if report.total() > 0 {
            tracing::info!(
                expired = report.expired,
                evicted = report.evicted,
                "Pruned event queue"
            );
        }
        Ok(report)
    }

    async fn stats(&self) -> anyhow::Result<QueueStats> {
        Ok(self.stats_inner().await?)
    }

    async fn has_pending(&self, min_priority: Priority) -> anyhow::Result<bool> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM events WHERE priority BETWEEN ? AND ?)",
        )
        .bind(min_priority.rank())
        .bind(Priority::Critical.rank())
        .fetch_one(&self.pool)
        .await
        .map_err(CacheError::from)?;
        Ok(pending)
    }

    fn signals(&self) -> QueueSignals {
        self.signals.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_dedup_ids_sorts_and_removes_duplicates() {
        let ids: Vec<EventId> = [5, 1, 5, 3]
            .into_iter()
            .map(|n| EventId::new(n).unwrap())
            .collect();
        assert_eq!(dedup_ids(&ids), vec![1, 3, 5]);
    }

    #[test]
    fn test_to_u64_clamps_negative() {
        assert_eq!(to_u64(-1), 0);
        assert_eq!(to_u64(42), 42);
    }
}
