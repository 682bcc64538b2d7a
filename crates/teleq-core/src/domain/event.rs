//! Queued telemetry events and the retention rules that bound them
//!
//! An [`EventRecord`] is created by the store on enqueue and afterwards only
//! its retry counter changes. It leaves the queue through exactly one of
//! three paths: upload acknowledgment, retry exhaustion, or pruning under
//! the [`RetentionPolicy`].

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{EventId, EventType};

// ============================================================================
// Priority
// ============================================================================

/// Delivery priority of an event
///
/// Variants are declared from least to most important, so the derived
/// `Ord` can be used directly: `Priority::Critical > Priority::Low`.
/// Priority decides both dequeue order and resistance to capacity eviction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities, lowest first
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Numeric rank used for storage and SQL ordering (Low = 0 .. Critical = 3)
    #[must_use]
    pub const fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Inverse of [`Priority::rank`]
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPriority` for ranks outside `0..=3`
    pub fn from_rank(rank: i64) -> Result<Self, DomainError> {
        match rank {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Critical),
            other => Err(DomainError::InvalidPriority(format!(
                "Unknown priority rank: {other}"
            ))),
        }
    }

    /// Lowercase name, matching the serde representation
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(DomainError::InvalidPriority(other.to_string())),
        }
    }
}

// ============================================================================
// EventInput
// ============================================================================

/// What a producer hands to the queue
///
/// The payload is already serialized by the producer; the queue stores it
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInput {
    pub event_type: EventType,
    pub payload: Vec<u8>,
    pub priority: Priority,
}

impl EventInput {
    pub fn new(event_type: EventType, payload: impl Into<Vec<u8>>, priority: Priority) -> Self {
        Self {
            event_type,
            payload: payload.into(),
            priority,
        }
    }

    /// A crash report, always queued as `Critical`
    pub fn crash(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(EventType::crash(), payload, Priority::Critical)
    }
}

// ============================================================================
// EventRecord
// ============================================================================

/// A persisted telemetry event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    id: EventId,
    event_type: EventType,
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
    retry_count: u32,
    priority: Priority,
}

impl EventRecord {
    /// Rebuild a record from its stored columns
    pub fn restore(
        id: EventId,
        event_type: EventType,
        payload: Vec<u8>,
        created_at: DateTime<Utc>,
        retry_count: u32,
        priority: Priority,
    ) -> Self {
        Self {
            id,
            event_type,
            payload,
            created_at,
            retry_count,
            priority,
        }
    }

    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Age of the record relative to `now` (zero if the clock went backwards)
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

// ============================================================================
// QueueStats
// ============================================================================

/// Diagnostic snapshot of the queue, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of stored rows
    pub total_count: u64,
    /// Timestamp of the oldest stored row
    pub oldest_created_at: Option<DateTime<Utc>>,
    /// Row counts keyed by event type tag
    pub count_by_type: BTreeMap<String, u64>,
    /// Row counts keyed by priority
    pub count_by_priority: BTreeMap<Priority, u64>,
    /// Undecodable rows skipped by reads since the store was opened
    pub corrupt_skipped: u64,
}

// ============================================================================
// RetentionPolicy
// ============================================================================

pub const DEFAULT_MAX_QUEUE_SIZE: u64 = 10_000;
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Limits that bound the queue's storage footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of rows kept after pruning
    pub max_queue_size: u64,
    /// Rows older than this are deleted regardless of priority
    pub max_age: Duration,
    /// A row is dropped once this many uploads of it have failed
    pub max_retries: u32,
}

impl RetentionPolicy {
    /// Oldest creation time a record may have at `now` and still be kept
    #[must_use]
    pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|max_age| now.checked_sub_signed(max_age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}
