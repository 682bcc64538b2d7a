//! Resource monitor - classifies device conditions before every flush
//!
//! The [`ResourceMonitor`] reads an [`IDeviceSensor`] and maps the reading
//! to a [`TelemetryMode`]. Nothing is cached: every call to
//! [`evaluate`](ResourceMonitor::evaluate) reads the sensor again.
//!
//! ## Sensors
//!
//! - [`WatchSensor`] - the host application pushes [`DeviceConditions`]
//!   through a [`SensorPublisher`]; the flush worker can subscribe to the
//!   same channel to react to connectivity changes.
//! - [`StaticSensor`] - fixed readings, for tools and tests.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{trace, warn};

use teleq_core::domain::{DeviceConditions, TelemetryMode};
use teleq_core::ports::IDeviceSensor;

// ============================================================================
// ResourceSnapshot
// ============================================================================

/// Outcome of one sensor evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    /// Raw readings; `None` when the sensor could not be read
    pub conditions: Option<DeviceConditions>,
    pub mode: TelemetryMode,
    pub online: bool,
}

impl ResourceSnapshot {
    /// Snapshot used when the sensor is unavailable
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            conditions: None,
            mode: TelemetryMode::Normal,
            online: true,
        }
    }

    #[must_use]
    pub fn from_conditions(conditions: DeviceConditions) -> Self {
        Self {
            conditions: Some(conditions),
            mode: TelemetryMode::classify(&conditions),
            online: conditions.connectivity.is_online(),
        }
    }
}

// ============================================================================
// ResourceMonitor
// ============================================================================

/// Evaluates the current telemetry mode from a device sensor
#[derive(Clone)]
pub struct ResourceMonitor {
    sensor: Arc<dyn IDeviceSensor>,
}

impl ResourceMonitor {
    pub fn new(sensor: Arc<dyn IDeviceSensor>) -> Self {
        Self { sensor }
    }

    /// Reads the sensor and classifies the result
    ///
    /// A sensor error falls back to `Normal` mode and assumes the device is
    /// online, so flushing neither stalls nor ignores the mode rules once
    /// readings come back.
    pub fn evaluate(&self) -> ResourceSnapshot {
        match self.sensor.current_conditions() {
            Ok(conditions) => {
                let snapshot = ResourceSnapshot::from_conditions(conditions);
                trace!(
                    mode = %snapshot.mode,
                    connectivity = %conditions.connectivity,
                    battery = ?conditions.battery_percent,
                    charging = conditions.charging,
                    thermal = %conditions.thermal,
                    "Evaluated device conditions"
                );
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Device sensor unavailable, assuming normal mode");
                ResourceSnapshot::fallback()
            }
        }
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor").finish_non_exhaustive()
    }
}

// ============================================================================
// WatchSensor / SensorPublisher
// ============================================================================

/// Push-based sensor backed by a `tokio::sync::watch` channel
#[derive(Debug, Clone)]
pub struct WatchSensor {
    rx: watch::Receiver<DeviceConditions>,
}

/// Write side of a [`WatchSensor`], held by the host application
#[derive(Debug)]
pub struct SensorPublisher {
    tx: watch::Sender<DeviceConditions>,
}

impl WatchSensor {
    /// Creates a connected publisher/sensor pair seeded with `initial`
    pub fn channel(initial: DeviceConditions) -> (SensorPublisher, WatchSensor) {
        let (tx, rx) = watch::channel(initial);
        (SensorPublisher { tx }, WatchSensor { rx })
    }

    /// A fresh receiver for change notifications
    pub fn subscribe(&self) -> watch::Receiver<DeviceConditions> {
        self.rx.clone()
    }
}

impl IDeviceSensor for WatchSensor {
    fn current_conditions(&self) -> anyhow::Result<DeviceConditions> {
        if self.rx.has_changed().is_err() {
            anyhow::bail!("Sensor publisher was dropped");
        }
        Ok(*self.rx.borrow())
    }
}

impl SensorPublisher {
    /// Replaces the current readings
    pub fn publish(&self, conditions: DeviceConditions) {
        self.tx.send_replace(conditions);
    }

    /// Modifies the current readings in place
    ///
    /// Subscribers are only woken if the readings actually changed.
    pub fn update(&self, f: impl FnOnce(&mut DeviceConditions)) {
        self.tx.send_if_modified(|current| {
            let before = *current;
            f(current);
            *current != before
        });
    }

    /// Latest published readings
    pub fn current(&self) -> DeviceConditions {
        *self.tx.borrow()
    }
}

// ============================================================================
// StaticSensor
// ============================================================================

/// Sensor that always reports the same readings
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSensor(pub DeviceConditions);

impl IDeviceSensor for StaticSensor {
    fn current_conditions(&self) -> anyhow::Result<DeviceConditions> {
        Ok(self.0)
    }
}
