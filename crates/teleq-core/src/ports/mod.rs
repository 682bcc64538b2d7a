//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IEventQueue`] - Durable, priority-ordered storage for telemetry events
//! - [`IUploader`] - Transmits one group of events to a backend
//! - [`IDeviceSensor`] - Current connectivity, power and thermal readings

pub mod device_sensor;
pub mod event_queue;
pub mod uploader;

pub use device_sensor::IDeviceSensor;
pub use event_queue::{IEventQueue, MarkFailedOutcome, PruneReport, QueueSignals};
pub use uploader::{IUploader, UploadError};
