//! teleq Flush - Adaptive flush pipeline
//!
//! Provides:
//! - Device condition monitoring and telemetry mode evaluation
//! - Batched, per-type uploads with bounded timeouts
//! - A single background worker reacting to timers, connectivity and
//!   critical events
//! - Prometheus metrics for cycles, uploads and drops
//!
//! ## Modules
//!
//! - [`monitor`] - Resource monitor and the watch-channel sensor
//! - [`controller`] - One flush cycle: dequeue, group, upload, reconcile
//! - [`scheduler`] - Background worker loop and its handle
//! - [`metrics`] - Prometheus registry for the pipeline

pub mod controller;
pub mod metrics;
pub mod monitor;
pub mod scheduler;

use std::time::Duration;

use thiserror::Error;

pub use controller::{FlushController, FlushOptions, FlushReport, FlushTrigger, SkipReason};
pub use metrics::QueueMetrics;
pub use monitor::{ResourceMonitor, ResourceSnapshot, SensorPublisher, StaticSensor, WatchSensor};
pub use scheduler::{FlushHandle, FlushWorker, WorkerOptions};

/// Errors surfaced to callers of the flush pipeline
#[derive(Debug, Error)]
pub enum FlushError {
    /// The background worker has stopped and no longer accepts requests
    #[error("Flush worker is not running")]
    WorkerStopped,

    /// A background flush did not finish within its time budget
    #[error("Background flush exceeded its budget of {0:?}")]
    BudgetExceeded(Duration),
}
