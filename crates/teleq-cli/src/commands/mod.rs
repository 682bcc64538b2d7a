//! CLI subcommands
//!
//! Every command receives a [`CommandContext`] carrying the output format
//! and the loaded configuration.

pub mod completions;
pub mod config;
pub mod enqueue;
pub mod export;
pub mod mode;
pub mod peek;
pub mod prune;
pub mod stats;

use std::path::PathBuf;

use anyhow::{Context, Result};
use teleq_cache::{DatabasePool, SqliteEventQueue};
use teleq_core::config::Config;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Shared state handed to every command
#[derive(Debug)]
pub struct CommandContext {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
    pub config: Config,
}

impl CommandContext {
    pub fn new(format: OutputFormat, quiet: bool, config_path: PathBuf, config: Config) -> Self {
        Self {
            format,
            quiet,
            config_path,
            config,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// Refuses to touch the store with an invalid configuration
    ///
    /// A zero `max_queue_size` or `max_retries` would make `prune` and
    /// `mark_failed` delete every stored event.
    pub fn ensure_valid_config(&self) -> Result<()> {
        let errors = self.config.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!(
            "Invalid configuration {}: {}. Run 'teleq config validate' for details.",
            self.config_path.display(),
            details.join("; ")
        )
    }

    /// Opens the configured queue database, creating it if needed
    pub async fn open_queue(&self) -> Result<(DatabasePool, SqliteEventQueue)> {
        self.ensure_valid_config()?;
        let db_path = &self.config.queue.database;
        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        let queue = SqliteEventQueue::new(pool.pool().clone(), self.config.queue.retention());
        Ok((pool, queue))
    }

    /// Opens the queue database only if it already exists
    ///
    /// Prints an error and returns `None` otherwise.
    pub async fn open_existing_queue(&self) -> Result<Option<(DatabasePool, SqliteEventQueue)>> {
        let db_path = &self.config.queue.database;
        if !db_path.exists() {
            self.formatter().error(&format!(
                "No queue database at {}. Run 'teleq enqueue' first.",
                db_path.display()
            ));
            return Ok(None);
        }
        self.open_queue().await.map(Some)
    }
}
