//! Enqueue command - Store a telemetry event
//!
//! Usage: `teleq enqueue --type crash --priority critical --payload '{"signal":11}'`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use teleq_core::domain::{EventInput, EventType, Priority};
use teleq_core::ports::IEventQueue;
use tracing::info;

use super::CommandContext;

/// Arguments for the enqueue subcommand
#[derive(Debug, Args)]
pub struct EnqueueCommand {
    /// Event type tag (e.g. crash, breadcrumb, metric, log, span)
    #[arg(short = 't', long = "type")]
    pub event_type: EventType,

    /// Upload priority: low, normal, high or critical
    #[arg(short, long, default_value = "normal")]
    pub priority: Priority,

    /// Inline payload (UTF-8)
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the payload from a file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,
}

impl EnqueueCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let payload = self.read_payload()?;
        let size = payload.len();

        let (pool, queue) = ctx.open_queue().await?;
        let id = queue
            .enqueue(EventInput::new(self.event_type.clone(), payload, self.priority))
            .await
            .context("Failed to enqueue event")?;
        pool.close().await;

        info!(id = %id, event_type = %self.event_type, priority = %self.priority, "Event enqueued");

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "id": id.as_i64(),
                "type": self.event_type.as_str(),
                "priority": self.priority.name(),
                "payload_bytes": size,
            }));
        } else {
            formatter.success(&format!(
                "Enqueued {} event #{} ({}, {} bytes)",
                self.event_type, id, self.priority, size
            ));
        }

        Ok(())
    }

    fn read_payload(&self) -> Result<Vec<u8>> {
        match (&self.payload, &self.payload_file) {
            (Some(inline), _) => Ok(inline.clone().into_bytes()),
            (None, Some(path)) => std::fs::read(path)
                .with_context(|| format!("Failed to read payload file {}", path.display())),
            (None, None) => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn command(payload: Option<&str>, payload_file: Option<PathBuf>) -> EnqueueCommand {
        EnqueueCommand {
            event_type: EventType::metric(),
            priority: Priority::Normal,
            payload: payload.map(str::to_string),
            payload_file,
        }
    }

    #[test]
    fn test_inline_payload() {
        let cmd = command(Some("{\"cpu\":0.4}"), None);
        assert_eq!(cmd.read_payload().unwrap(), b"{\"cpu\":0.4}".to_vec());
    }

    #[test]
    fn test_payload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0, 159, 146, 150]).unwrap();
        let cmd = command(None, Some(file.path().to_path_buf()));
        assert_eq!(cmd.read_payload().unwrap(), vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_missing_payload_file_fails() {
        let cmd = command(None, Some(PathBuf::from("/nonexistent/payload.bin")));
        assert!(cmd.read_payload().is_err());
    }

    #[test]
    fn test_no_payload_is_empty() {
        assert!(command(None, None).read_payload().unwrap().is_empty());
    }
}
