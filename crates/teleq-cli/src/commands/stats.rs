//! Stats command - Display queue statistics
//!
//! Shows the number of stored events, the oldest timestamp, and counts by
//! event type and priority.

use anyhow::{Context, Result};
use clap::Args;
use teleq_core::ports::IEventQueue;
use tracing::info;

use super::CommandContext;

/// Arguments for the stats subcommand
#[derive(Debug, Args)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let Some((pool, queue)) = ctx.open_existing_queue().await? else {
            return Ok(());
        };

        let stats = queue.stats().await.context("Failed to compute queue statistics")?;
        pool.close().await;

        info!(total = stats.total_count, "Showing queue statistics");

        if ctx.is_json() {
            let json = serde_json::to_value(&stats).context("Failed to serialize statistics")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!(
            "Queue {} - {} event{}",
            ctx.config.queue.database.display(),
            stats.total_count,
            if stats.total_count == 1 { "" } else { "s" }
        ));

        match stats.oldest_created_at {
            Some(oldest) => {
                formatter.info(&format!("Oldest: {}", oldest.format("%Y-%m-%d %H:%M:%S UTC")))
            }
            None => formatter.info("Oldest: -"),
        }

        if !stats.count_by_type.is_empty() {
            formatter.info("");
            formatter.info("By type:");
            for (event_type, count) in &stats.count_by_type {
                formatter.info(&format!("  {:<12} {}", event_type, count));
            }
        }

        if !stats.count_by_priority.is_empty() {
            formatter.info("");
            formatter.info("By priority:");
            for (priority, count) in stats.count_by_priority.iter().rev() {
                formatter.info(&format!("  {:<12} {}", priority.name(), count));
            }
        }

        if stats.corrupt_skipped > 0 {
            formatter.warn(&format!(
                "{} corrupt row(s) skipped while reading",
                stats.corrupt_skipped
            ));
        }

        Ok(())
    }
}
