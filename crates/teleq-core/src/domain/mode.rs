//! Device conditions and the telemetry mode derived from them
//!
//! [`TelemetryMode::classify`] is a pure function of the current readings.
//! Nothing here is persisted: the flush pipeline recomputes the mode before
//! every cycle and on every connectivity notification.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::event::Priority;

/// Battery percentage below which the device is treated as critically low
pub const CRITICAL_BATTERY_PERCENT: u8 = 10;

/// Battery percentage below which flushing is reduced
pub const LOW_BATTERY_PERCENT: u8 = 20;

// ============================================================================
// Connectivity
// ============================================================================

/// Network reachability and link type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Offline,
    #[default]
    Wifi,
    Cellular,
    Ethernet,
}

impl Connectivity {
    #[must_use]
    pub const fn is_online(&self) -> bool {
        !matches!(self, Connectivity::Offline)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Connectivity::Offline => "offline",
            Connectivity::Wifi => "wifi",
            Connectivity::Cellular => "cellular",
            Connectivity::Ethernet => "ethernet",
        }
    }
}

impl Display for Connectivity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Connectivity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" | "none" => Ok(Connectivity::Offline),
            "wifi" => Ok(Connectivity::Wifi),
            "cellular" => Ok(Connectivity::Cellular),
            "ethernet" => Ok(Connectivity::Ethernet),
            other => Err(DomainError::InvalidReading(format!(
                "Unknown connectivity: {other}"
            ))),
        }
    }
}

// ============================================================================
// ThermalState
// ============================================================================

/// Thermal pressure as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ThermalState::Nominal => "nominal",
            ThermalState::Fair => "fair",
            ThermalState::Serious => "serious",
            ThermalState::Critical => "critical",
        }
    }
}

impl Display for ThermalState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThermalState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nominal" => Ok(ThermalState::Nominal),
            "fair" => Ok(ThermalState::Fair),
            "serious" => Ok(ThermalState::Serious),
            "critical" => Ok(ThermalState::Critical),
            other => Err(DomainError::InvalidReading(format!(
                "Unknown thermal state: {other}"
            ))),
        }
    }
}

// ============================================================================
// DeviceConditions
// ============================================================================

/// One snapshot of the sensor readings the flush pipeline cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConditions {
    pub connectivity: Connectivity,
    pub charging: bool,
    /// Battery charge in percent; `None` when the platform does not report it
    pub battery_percent: Option<u8>,
    pub low_power_mode: bool,
    pub thermal: ThermalState,
}

impl DeviceConditions {
    /// Builder-style helper for tests and the CLI
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub fn with_battery(mut self, percent: u8) -> Self {
        self.battery_percent = Some(percent.min(100));
        self
    }

    #[must_use]
    pub fn with_charging(mut self, charging: bool) -> Self {
        self.charging = charging;
        self
    }

    #[must_use]
    pub fn with_low_power_mode(mut self, enabled: bool) -> Self {
        self.low_power_mode = enabled;
        self
    }

    #[must_use]
    pub fn with_thermal(mut self, thermal: ThermalState) -> Self {
        self.thermal = thermal;
        self
    }
}

// ============================================================================
// TelemetryMode
// ============================================================================

/// Coarse throttling level, most permissive first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    Full,
    Normal,
    Reduced,
    Minimal,
}

impl TelemetryMode {
    /// Classify the current device conditions
    ///
    /// Rules are evaluated top to bottom and the first match wins:
    ///
    /// | Condition                                    | Mode      |
    /// |----------------------------------------------|-----------|
    /// | charging                                     | `Full`    |
    /// | low-power mode or critical thermal           | `Minimal` |
    /// | battery < 10% or serious thermal             | `Reduced` |
    /// | battery < 20%                                | `Reduced` |
    /// | otherwise                                    | `Normal`  |
    ///
    /// Connectivity does not influence the mode; the flush controller checks
    /// it separately.
    #[must_use]
    pub fn classify(conditions: &DeviceConditions) -> Self {
        let battery_below = |threshold: u8| {
            conditions
                .battery_percent
                .is_some_and(|level| level < threshold)
        };

        if conditions.charging {
            TelemetryMode::Full
        } else if conditions.low_power_mode || conditions.thermal == ThermalState::Critical {
            TelemetryMode::Minimal
        } else if battery_below(CRITICAL_BATTERY_PERCENT)
            || conditions.thermal == ThermalState::Serious
        {
            TelemetryMode::Reduced
        } else if battery_below(LOW_BATTERY_PERCENT) {
            TelemetryMode::Reduced
        } else {
            TelemetryMode::Normal
        }
    }

    /// Lowest priority that may be uploaded in this mode
    #[must_use]
    pub const fn min_priority(&self) -> Priority {
        match self {
            TelemetryMode::Minimal => Priority::Critical,
            _ => Priority::Low,
        }
    }

    /// Records to request per cycle given the configured batch size
    #[must_use]
    pub fn batch_limit(&self, batch_size: u32) -> u32 {
        match self {
            TelemetryMode::Reduced => (batch_size / 2).max(1),
            _ => batch_size,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            TelemetryMode::Full => "full",
            TelemetryMode::Normal => "normal",
            TelemetryMode::Reduced => "reduced",
            TelemetryMode::Minimal => "minimal",
        }
    }
}

impl Display for TelemetryMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// FlushIntervals
// ============================================================================

/// Periodic flush interval per mode; `None` disables the timer for that mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushIntervals {
    pub full: Option<Duration>,
    pub normal: Option<Duration>,
    pub reduced: Option<Duration>,
    pub minimal: Option<Duration>,
}

impl FlushIntervals {
    #[must_use]
    pub fn for_mode(&self, mode: TelemetryMode) -> Option<Duration> {
        match mode {
            TelemetryMode::Full => self.full,
            TelemetryMode::Normal => self.normal,
            TelemetryMode::Reduced => self.reduced,
            TelemetryMode::Minimal => self.minimal,
        }
    }
}

impl Default for FlushIntervals {
    fn default() -> Self {
        Self {
            full: Some(Duration::from_secs(15)),
            normal: Some(Duration::from_secs(30)),
            reduced: Some(Duration::from_secs(60)),
            minimal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DeviceConditions {
        DeviceConditions::default().with_battery(80)
    }

    #[test]
    fn charging_wins_over_everything() {
        let c = base()
            .with_charging(true)
            .with_low_power_mode(true)
            .with_thermal(ThermalState::Critical)
            .with_battery(3);
        assert_eq!(TelemetryMode::classify(&c), TelemetryMode::Full);
    }

    #[test]
    fn low_power_or_critical_thermal_is_minimal() {
        assert_eq!(
            TelemetryMode::classify(&base().with_low_power_mode(true)),
            TelemetryMode::Minimal
        );
        assert_eq!(
            TelemetryMode::classify(&base().with_thermal(ThermalState::Critical)),
            TelemetryMode::Minimal
        );
    }

    #[test]
    fn low_battery_or_serious_thermal_is_reduced() {
        assert_eq!(
            TelemetryMode::classify(&base().with_battery(5)),
            TelemetryMode::Reduced
        );
        assert_eq!(
            TelemetryMode::classify(&base().with_battery(19)),
            TelemetryMode::Reduced
        );
        assert_eq!(
            TelemetryMode::classify(&base().with_thermal(ThermalState::Serious)),
            TelemetryMode::Reduced
        );
    }

    #[test]
    fn battery_thresholds_are_exclusive() {
        assert_eq!(
            TelemetryMode::classify(&base().with_battery(20)),
            TelemetryMode::Normal
        );
    }

    #[test]
    fn unknown_battery_is_normal() {
        let c = DeviceConditions::default();
        assert!(c.battery_percent.is_none());
        assert_eq!(TelemetryMode::classify(&c), TelemetryMode::Normal);
    }

    #[test]
    fn fair_thermal_does_not_throttle() {
        assert_eq!(
            TelemetryMode::classify(&base().with_thermal(ThermalState::Fair)),
            TelemetryMode::Normal
        );
    }

    #[test]
    fn connectivity_does_not_affect_mode() {
        let c = base().with_connectivity(Connectivity::Offline);
        assert_eq!(TelemetryMode::classify(&c), TelemetryMode::Normal);
        assert!(!c.connectivity.is_online());
    }

    #[test]
    fn modes_order_most_to_least_permissive() {
        assert!(TelemetryMode::Full < TelemetryMode::Normal);
        assert!(TelemetryMode::Normal < TelemetryMode::Reduced);
        assert!(TelemetryMode::Reduced < TelemetryMode::Minimal);
    }

    #[test]
    fn batch_limit_halves_in_reduced_mode() {
        assert_eq!(TelemetryMode::Normal.batch_limit(100), 100);
        assert_eq!(TelemetryMode::Reduced.batch_limit(100), 50);
        assert_eq!(TelemetryMode::Reduced.batch_limit(1), 1);
        assert_eq!(TelemetryMode::Minimal.min_priority(), Priority::Critical);
        assert_eq!(TelemetryMode::Full.min_priority(), Priority::Low);
    }

    #[test]
    fn default_intervals() {
        let intervals = FlushIntervals::default();
        assert_eq!(
            intervals.for_mode(TelemetryMode::Full),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            intervals.for_mode(TelemetryMode::Normal),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            intervals.for_mode(TelemetryMode::Reduced),
            Some(Duration::from_secs(60))
        );
        assert_eq!(intervals.for_mode(TelemetryMode::Minimal), None);
    }

    #[test]
    fn readings_parse_from_strings() {
        assert_eq!("WiFi".parse::<Connectivity>().unwrap(), Connectivity::Wifi);
        assert_eq!("none".parse::<Connectivity>().unwrap(), Connectivity::Offline);
        assert_eq!(
            "serious".parse::<ThermalState>().unwrap(),
            ThermalState::Serious
        );
        assert!("lukewarm".parse::<ThermalState>().is_err());
    }
}
