//! Domain entities and business logic
//!
//! This module contains the core domain types for teleq:
//! - Newtypes for event identifiers and type tags
//! - Queued events, their priorities and the retention policy
//! - Device conditions and telemetry mode classification
//! - Domain-specific error types

pub mod errors;
pub mod event;
pub mod mode;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use event::{EventInput, EventRecord, Priority, QueueStats, RetentionPolicy};
pub use mode::{Connectivity, DeviceConditions, FlushIntervals, TelemetryMode, ThermalState};
pub use newtypes::*;
