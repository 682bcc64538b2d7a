//! Peek command - List the next events in flush order
//!
//! Reads without removing anything: the same non-destructive dequeue the
//! flush controller uses.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use teleq_core::domain::{EventRecord, Priority};
use teleq_core::ports::IEventQueue;

use super::CommandContext;

/// Arguments for the peek subcommand
#[derive(Debug, Args)]
pub struct PeekCommand {
    /// Maximum number of events to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: u32,

    /// Only show events at or above this priority
    #[arg(long)]
    pub min_priority: Option<Priority>,
}

impl PeekCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let Some((pool, queue)) = ctx.open_existing_queue().await? else {
            return Ok(());
        };

        let records = match self.min_priority {
            Some(min) => queue.dequeue_at_least(self.limit, min).await,
            None => queue.dequeue(self.limit).await,
        }
        .context("Failed to read events")?;
        pool.close().await;
        let now = Utc::now();

        if ctx.is_json() {
            let items: Vec<serde_json::Value> =
                records.iter().map(|r| record_json(r, now)).collect();
            formatter.print_json(&serde_json::json!({ "events": items }));
            return Ok(());
        }

        if records.is_empty() {
            formatter.info("Queue is empty");
            return Ok(());
        }

        formatter.success(&format!("Next {} event(s) in flush order", records.len()));
        formatter.info("");
        formatter.info(&format!(
            "{:>8}  {:<12} {:<9} {:>7}  {:>8}  {:>7}  CREATED",
            "ID", "TYPE", "PRIORITY", "RETRIES", "BYTES", "AGE"
        ));
        for record in &records {
            formatter.info(&format!(
                "{:>8}  {:<12} {:<9} {:>7}  {:>8}  {:>7}  {}",
                record.id().as_i64(),
                record.event_type().as_str(),
                record.priority().name(),
                record.retry_count(),
                record.payload().len(),
                format_age(record.age(now)),
                record.created_at().format("%Y-%m-%d %H:%M:%S%.3f")
            ));
        }

        Ok(())
    }
}

fn record_json(record: &EventRecord, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "id": record.id().as_i64(),
        "type": record.event_type().as_str(),
        "priority": record.priority().name(),
        "created_at": record.created_at().to_rfc3339(),
        "age_seconds": record.age(now).as_secs(),
        "retry_count": record.retry_count(),
        "payload_bytes": record.payload().len(),
    })
}

/// Compact age such as `42s`, `17m`, `5h` or `3d`
fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        _ => format!("{}d", secs / 86_400),
    }
}
