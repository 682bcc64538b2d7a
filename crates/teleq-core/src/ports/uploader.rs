//! Uploader port (driven/secondary port)
//!
//! The flush controller hands one group of same-type records at a time to
//! an [`IUploader`]. Concrete backends (HTTP ingestion endpoints, vendor
//! SDK bridges) live outside this crate.

use thiserror::Error;

use crate::domain::{EventRecord, EventType};

/// Why an upload did not succeed
///
/// Both variants are reconciled the same way by the flush controller: the
/// records go through `mark_failed` and count toward the retry cap. The
/// distinction is kept for logging and metrics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Network error, server error or throttling; may succeed later
    #[error("Transient upload failure: {0}")]
    Transient(String),

    /// The backend rejected the payload; retrying will not help
    #[error("Permanent upload failure: {0}")]
    Permanent(String),
}

impl UploadError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, UploadError::Permanent(_))
    }

    /// Short label for metrics and logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Transient(_) => "transient",
            UploadError::Permanent(_) => "permanent",
        }
    }
}

/// Port trait for transmitting events to a telemetry backend
///
/// Implementations may be slow; the caller bounds every call with a
/// timeout and treats a timeout like a transient failure.
#[async_trait::async_trait]
pub trait IUploader: Send + Sync {
    /// Uploads `records`, all of which share `event_type`
    async fn upload(&self, event_type: &EventType, records: &[EventRecord])
        -> Result<(), UploadError>;
}
