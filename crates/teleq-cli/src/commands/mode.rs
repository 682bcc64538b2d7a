//! Mode command - Classify device conditions into a telemetry mode
//!
//! Shows which mode a set of readings maps to and what the flush pipeline
//! would do in it, using the configured intervals and batch size.
//!
//! Usage: `teleq mode --battery 15 --connectivity cellular`

use anyhow::Result;
use clap::Args;
use teleq_core::config::FlushConfig;
use teleq_core::domain::{Connectivity, DeviceConditions, TelemetryMode, ThermalState};

use super::CommandContext;

/// Arguments for the mode subcommand
#[derive(Debug, Args)]
pub struct ModeCommand {
    /// Network connectivity: offline, wifi, cellular or ethernet
    #[arg(long, default_value = "wifi")]
    pub connectivity: Connectivity,

    /// Device is charging
    #[arg(long)]
    pub charging: bool,

    /// Battery level in percent
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub battery: Option<u8>,

    /// OS low-power mode is enabled
    #[arg(long)]
    pub low_power: bool,

    /// Thermal state: nominal, fair, serious or critical
    #[arg(long, default_value = "nominal")]
    pub thermal: ThermalState,
}

/// What the flush pipeline does under a given set of readings
#[derive(Debug, PartialEq, Eq)]
struct ModeSummary {
    mode: TelemetryMode,
    online: bool,
    interval_seconds: Option<u64>,
    batch_limit: u32,
    min_priority: &'static str,
}

impl ModeSummary {
    fn new(conditions: &DeviceConditions, flush: &FlushConfig) -> Self {
        let mode = TelemetryMode::classify(conditions);
        Self {
            mode,
            online: conditions.connectivity.is_online(),
            interval_seconds: flush
                .intervals
                .to_intervals()
                .for_mode(mode)
                .map(|d| d.as_secs()),
            batch_limit: mode.batch_limit(flush.batch_size),
            min_priority: mode.min_priority().name(),
        }
    }
}

impl ModeCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let conditions = self.conditions();
        let summary = ModeSummary::new(&conditions, &ctx.config.flush);

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "conditions": conditions,
                "mode": summary.mode,
                "online": summary.online,
                "interval_seconds": summary.interval_seconds,
                "batch_limit": summary.batch_limit,
                "min_priority": summary.min_priority,
            }));
            return Ok(());
        }

        formatter.success(&format!("Telemetry mode: {}", summary.mode));
        match summary.interval_seconds {
            Some(secs) => formatter.info(&format!("Periodic flush: every {}s", secs)),
            None => formatter.info("Periodic flush: disabled"),
        }
        formatter.info(&format!("Batch limit: {} event(s)", summary.batch_limit));
        formatter.info(&format!("Uploads: {} priority and above", summary.min_priority));
        if !summary.online {
            formatter.warn("Device is offline: flush cycles will be skipped");
        }

        Ok(())
    }

    fn conditions(&self) -> DeviceConditions {
        let mut conditions = DeviceConditions::default()
            .with_connectivity(self.connectivity)
            .with_charging(self.charging)
            .with_low_power_mode(self.low_power)
            .with_thermal(self.thermal);
        if let Some(level) = self.battery {
            conditions = conditions.with_battery(level);
        }
        conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> ModeCommand {
        ModeCommand {
            connectivity: Connectivity::Wifi,
            charging: false,
            battery: None,
            low_power: false,
            thermal: ThermalState::Nominal,
        }
    }

    #[test]
    fn test_default_readings_are_normal() {
        let summary = ModeSummary::new(&command().conditions(), &FlushConfig::default());
        assert_eq!(
            summary,
            ModeSummary {
                mode: TelemetryMode::Normal,
                online: true,
                interval_seconds: Some(30),
                batch_limit: 100,
                min_priority: "low",
            }
        );
    }

    #[test]
    fn test_low_battery_is_reduced() {
        let cmd = ModeCommand {
            battery: Some(15),
            ..command()
        };
        let summary = ModeSummary::new(&cmd.conditions(), &FlushConfig::default());
        assert_eq!(summary.mode, TelemetryMode::Reduced);
        assert_eq!(summary.interval_seconds, Some(60));
        assert_eq!(summary.batch_limit, 50);
    }

    #[test]
    fn test_low_power_is_minimal_without_timer() {
        let cmd = ModeCommand {
            low_power: true,
            ..command()
        };
        let summary = ModeSummary::new(&cmd.conditions(), &FlushConfig::default());
        assert_eq!(summary.mode, TelemetryMode::Minimal);
        assert_eq!(summary.interval_seconds, None);
        assert_eq!(summary.min_priority, "critical");
    }

    #[test]
    fn test_charging_wins_over_low_power() {
        let cmd = ModeCommand {
            charging: true,
            low_power: true,
            connectivity: Connectivity::Offline,
            ..command()
        };
        let summary = ModeSummary::new(&cmd.conditions(), &FlushConfig::default());
        assert_eq!(summary.mode, TelemetryMode::Full);
        assert!(!summary.online);
    }
}
