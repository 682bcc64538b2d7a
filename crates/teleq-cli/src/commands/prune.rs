//! Prune command - Apply the retention policy on demand

use anyhow::{Context, Result};
use clap::Args;
use teleq_core::ports::IEventQueue;
use tracing::info;

use super::CommandContext;

/// Arguments for the prune subcommand
#[derive(Debug, Args)]
pub struct PruneCommand {}

impl PruneCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let Some((pool, queue)) = ctx.open_existing_queue().await? else {
            return Ok(());
        };

        let policy = *queue.policy();
        let report = queue.prune().await.context("Failed to prune queue")?;
        let remaining = queue.stats().await.context("Failed to count events")?.total_count;
        pool.close().await;

        info!(
            expired = report.expired,
            evicted = report.evicted,
            remaining,
            "Prune finished"
        );

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "expired": report.expired,
                "evicted": report.evicted,
                "remaining": remaining,
                "max_queue_size": policy.max_queue_size,
                "max_age_seconds": policy.max_age.as_secs(),
            }));
        } else if report.total() == 0 {
            formatter.success(&format!("Nothing to prune ({} event(s) stored)", remaining));
        } else {
            formatter.success(&format!("Pruned {} event(s)", report.total()));
            formatter.info(&format!(
                "Expired (older than {}s): {}",
                policy.max_age.as_secs(),
                report.expired
            ));
            formatter.info(&format!(
                "Evicted (over {} events): {}",
                policy.max_queue_size, report.evicted
            ));
            formatter.info(&format!("Remaining: {}", remaining));
        }

        Ok(())
    }
}
