//! Export command - Flush queued events into a JSON Lines file
//!
//! Runs the real flush controller with a file-backed uploader, so events
//! leave the queue exactly as they would on upload: grouped by type, in
//! priority order, and deleted only once their line is written.
//!
//! Each line is one event:
//!
//! ```json
//! {"id":7,"type":"crash","priority":"critical","created_at":"...","retry_count":0,"payload":"<base64>"}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use teleq_core::domain::{DeviceConditions, EventRecord, EventType};
use teleq_core::ports::{IUploader, UploadError};
use teleq_flush::{
    FlushController, FlushOptions, FlushReport, FlushTrigger, QueueMetrics, ResourceMonitor,
    StaticSensor,
};
use tracing::{debug, info};

use super::CommandContext;

/// Arguments for the export subcommand
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Destination file (appended to if it exists)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Keep flushing until the queue is drained
    #[arg(long)]
    pub all: bool,

    /// Print Prometheus metrics for the run
    #[arg(long)]
    pub metrics: bool,
}

impl ExportCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let Some((pool, queue)) = ctx.open_existing_queue().await? else {
            return Ok(());
        };

        let uploader = Arc::new(JsonLinesUploader::create(&self.output)?);
        let metrics = Arc::new(QueueMetrics::new()?);

        // Exports are not throttled: run as if the device were charging
        let sensor = StaticSensor(DeviceConditions::default().with_charging(true));
        let controller = FlushController::new(
            Arc::new(queue),
            uploader.clone(),
            ResourceMonitor::new(Arc::new(sensor)),
            FlushOptions::from_config(&ctx.config.flush),
        )
        .with_metrics(metrics.clone());

        let mut reports = Vec::new();
        loop {
            let report = controller.run_cycle(FlushTrigger::Manual).await;
            let progressed = report.skipped.is_none() && report.errors.is_empty();
            reports.push(report);
            if !self.all || !progressed {
                break;
            }
        }
        pool.close().await;

        let summary = ExportSummary::from_reports(&reports);
        info!(
            output = %self.output.display(),
            exported = summary.exported,
            cycles = reports.len(),
            "Export finished"
        );

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "output": self.output.display().to_string(),
                "cycles": reports.len(),
                "exported": summary.exported,
                "retried": summary.retried,
                "dropped": summary.dropped,
                "errors": summary.errors,
            }));
        } else {
            formatter.success(&format!(
                "Exported {} event(s) to {}",
                summary.exported,
                self.output.display()
            ));
            if summary.retried > 0 || summary.dropped > 0 {
                formatter.info(&format!(
                    "Retried: {}, dropped: {}",
                    summary.retried, summary.dropped
                ));
            }
            for error in &summary.errors {
                formatter.warn(error);
            }
        }

        if self.metrics {
            print!("{}", metrics.encode()?);
        }

        Ok(())
    }
}

/// Totals across the cycles of one export
#[derive(Debug, Default)]
struct ExportSummary {
    exported: u64,
    retried: u64,
    dropped: u64,
    errors: Vec<String>,
}

impl ExportSummary {
    fn from_reports(reports: &[FlushReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, report| {
            acc.exported += report.sent;
            acc.retried += report.retried;
            acc.dropped += report.dropped;
            acc.errors.extend(report.errors.iter().cloned());
            acc
        })
    }
}

// ============================================================================
// JsonLinesUploader
// ============================================================================

/// Uploader that appends each event as one JSON line to a file
///
/// Lines are encoded on the async side; the file write and flush run on
/// the blocking pool.
pub struct JsonLinesUploader {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl JsonLinesUploader {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

#[async_trait::async_trait]
impl IUploader for JsonLinesUploader {
    async fn upload(
        &self,
        event_type: &EventType,
        records: &[EventRecord],
    ) -> Result<(), UploadError> {
        debug!(event_type = %event_type, count = records.len(), "Writing export group");
        let lines = encode_group(records)
            .map_err(|e| UploadError::Permanent(format!("encoding failed: {e}")))?;

        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || append_lines(&writer, &lines))
            .await
            .map_err(|e| UploadError::Transient(format!("export task failed: {e}")))?
            .map_err(|e| UploadError::Transient(format!("write failed: {e}")))
    }
}

fn encode_group(records: &[EventRecord]) -> serde_json::Result<Vec<u8>> {
    let mut lines = Vec::new();
    for record in records {
        serde_json::to_writer(&mut lines, &line(record))?;
        lines.push(b'\n');
    }
    Ok(lines)
}

/// Writes one group in a single locked append
fn append_lines(writer: &Mutex<BufWriter<File>>, lines: &[u8]) -> std::io::Result<()> {
    let mut writer = writer
        .lock()
        .map_err(|_| std::io::Error::other("export writer poisoned"))?;
    writer.write_all(lines)?;
    // Records are deleted right after this returns
    writer.flush()
}

fn line(record: &EventRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id().as_i64(),
        "type": record.event_type().as_str(),
        "priority": record.priority().name(),
        "created_at": record.created_at().to_rfc3339(),
        "retry_count": record.retry_count(),
        "payload": STANDARD.encode(record.payload()),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use teleq_core::domain::{EventId, Priority};

    use super::*;

    fn record(id: i64, event_type: &str, payload: &[u8]) -> EventRecord {
        EventRecord::restore(
            EventId::new(id).unwrap(),
            EventType::new(event_type).unwrap(),
            payload.to_vec(),
            Utc::now(),
            1,
            Priority::High,
        )
    }

    #[tokio::test]
    async fn test_upload_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.jsonl");
        let uploader = JsonLinesUploader::create(&path).unwrap();

        let records = vec![record(1, "metric", b"\x00\x01"), record(2, "metric", b"hi")];
        uploader
            .upload(&EventType::metric(), &records)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["type"], "metric");
        assert_eq!(lines[0]["priority"], "high");
        assert_eq!(lines[0]["retry_count"], 1);
        assert_eq!(lines[0]["payload"], "AAE=");
        assert_eq!(lines[1]["payload"], "aGk=");
    }

    #[tokio::test]
    async fn test_existing_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.jsonl");
        std::fs::write(&path, "{\"id\":0}\n").unwrap();

        let uploader = JsonLinesUploader::create(&path).unwrap();
        uploader
            .upload(&EventType::crash(), &[record(5, "crash", b"x")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("{\"id\":0}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_groups_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.jsonl");
        let uploader = Arc::new(JsonLinesUploader::create(&path).unwrap());

        let mut tasks = Vec::new();
        for (offset, tag) in [(0, "metric"), (100, "log")] {
            let uploader = Arc::clone(&uploader);
            tasks.push(tokio::spawn(async move {
                let records: Vec<EventRecord> =
                    (1..=50).map(|i| record(offset + i, tag, b"payload")).collect();
                uploader
                    .upload(&EventType::new(tag).unwrap(), &records)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let types: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].to_string())
            .collect();
        assert_eq!(types.len(), 100);
        // Each group is one contiguous block
        let switches = types.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(switches, 1);
    }

    #[test]
    fn test_encode_group_is_one_line_per_record() {
        let lines = encode_group(&[record(1, "span", b""), record(2, "span", b"z")]).unwrap();
        let text = String::from_utf8(lines).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        assert!(JsonLinesUploader::create(Path::new("/nonexistent/dir/out.jsonl")).is_err());
    }

    #[test]
    fn test_summary_totals_reports() {
        let summary = ExportSummary::from_reports(&[]);
        assert_eq!(summary.exported, 0);
        assert!(summary.errors.is_empty());
    }
}
