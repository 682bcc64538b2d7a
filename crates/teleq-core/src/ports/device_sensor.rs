//! Device sensor port (driven/secondary port)
//!
//! Supplies the connectivity, power and thermal readings that the flush
//! pipeline classifies into a [`TelemetryMode`](crate::domain::TelemetryMode).
//! Reads are synchronous snapshots; push-based platforms publish into a
//! channel and the implementation returns the latest value.

use crate::domain::DeviceConditions;

/// Port trait for reading current device conditions
///
/// An error means the platform API is unavailable. Callers fall back to
/// `TelemetryMode::Normal` and assume the device is online.
pub trait IDeviceSensor: Send + Sync {
    fn current_conditions(&self) -> anyhow::Result<DeviceConditions>;
}
