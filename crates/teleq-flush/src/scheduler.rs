//! Flush worker - the single background loop that drives flush cycles
//!
//! The [`FlushWorker`] owns the [`FlushController`] and decides when a
//! cycle runs. Producers and the host application talk to it through a
//! cloneable [`FlushHandle`].
//!
//! ## Flow
//!
//! ```text
//!   mode timer ─────────┐
//!   critical enqueue ───┤
//!   offline → online ───┼──→ FlushWorker ──→ FlushController::run_cycle
//!   FlushHandle cmds ───┤         │
//!   prune signal/timer ─┘         └──→ FlushController::prune
//! ```
//!
//! The periodic interval follows the current [`TelemetryMode`]
//! and is re-evaluated on every loop iteration, so a mode change takes
//! effect without restarting the worker. In `Minimal` mode the timer is
//! disabled entirely.
//!
//! Every cycle races the shutdown token. An abandoned cycle never reaches
//! reconciliation, so its records stay queued with their retry counts
//! untouched.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use teleq_core::config::FlushConfig;
use teleq_core::domain::{DeviceConditions, FlushIntervals};

use crate::controller::{FlushController, FlushReport, FlushTrigger};
use crate::FlushError;

/// Capacity of the command channel between handles and the worker
const COMMAND_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// WorkerOptions
// ============================================================================

/// Timing configuration for the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub intervals: FlushIntervals,
    /// Maintenance prune period
    pub prune_interval: Duration,
    /// Upper bound for the flush triggered by going to background
    pub background_budget: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &FlushConfig) -> Self {
        Self {
            intervals: config.intervals.to_intervals(),
            prune_interval: config.prune_interval(),
            background_budget: config.background_budget(),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&FlushConfig::default())
    }
}

// ============================================================================
// Commands / FlushHandle
// ============================================================================

type Reply = oneshot::Sender<Result<FlushReport, FlushError>>;

#[derive(Debug)]
enum FlushCommand {
    /// Run a cycle now; reply is optional for fire-and-forget requests
    FlushNow { reply: Option<Reply> },
    Foreground,
    /// Dropped unanswered once `deadline` passes
    Background { reply: Reply, deadline: Instant },
}

/// Cloneable handle for requesting flushes from the worker
#[derive(Debug, Clone)]
pub struct FlushHandle {
    tx: mpsc::Sender<FlushCommand>,
    background_budget: Duration,
}

impl FlushHandle {
    /// Asks the worker to flush soon without waiting for the result
    ///
    /// Requests coalesce: if the command queue is full a flush is already
    /// pending and this call succeeds without enqueuing another.
    pub fn request_flush(&self) -> Result<(), FlushError> {
        match self.tx.try_send(FlushCommand::FlushNow { reply: None }) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FlushError::WorkerStopped),
        }
    }

    /// Runs a flush cycle and waits for its report
    pub async fn flush_now(&self) -> Result<FlushReport, FlushError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FlushCommand::FlushNow { reply: Some(reply) })
            .await
            .map_err(|_| FlushError::WorkerStopped)?;
        rx.await.map_err(|_| FlushError::WorkerStopped)?
    }

    /// Notifies the worker that the app returned to the foreground
    pub fn app_foreground(&self) -> Result<(), FlushError> {
        match self.tx.try_send(FlushCommand::Foreground) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FlushError::WorkerStopped),
        }
    }

    /// Best-effort flush before the app is suspended
    ///
    /// Returns within the background budget whether or not the flush
    /// finished. An interrupted cycle leaves every un-acknowledged record
    /// in the queue.
    pub async fn app_background(&self) -> Result<FlushReport, FlushError> {
        let budget = self.background_budget;
        let deadline = Instant::now() + budget;
        let request = async {
            let (reply, rx) = oneshot::channel();
            self.tx
                .send(FlushCommand::Background { reply, deadline })
                .await
                .map_err(|_| FlushError::WorkerStopped)?;
            rx.await.map_err(|_| FlushError::WorkerStopped)?
        };

        match tokio::time::timeout_at(deadline, request).await {
            Ok(result) => result,
            Err(_) => Err(FlushError::BudgetExceeded(budget)),
        }
    }
}

// ============================================================================
// FlushWorker
// ============================================================================

/// Background loop that owns the flush controller
pub struct FlushWorker {
    controller: Arc<FlushController>,
    options: WorkerOptions,
    commands: mpsc::Receiver<FlushCommand>,
    connectivity: Option<watch::Receiver<DeviceConditions>>,
    shutdown: CancellationToken,
}

impl FlushWorker {
    /// Creates a worker and the handle used to talk to it
    pub fn new(
        controller: Arc<FlushController>,
        options: WorkerOptions,
        shutdown: CancellationToken,
    ) -> (Self, FlushHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        info!(
            full_secs = ?options.intervals.full.map(|d| d.as_secs()),
            normal_secs = ?options.intervals.normal.map(|d| d.as_secs()),
            reduced_secs = ?options.intervals.reduced.map(|d| d.as_secs()),
            prune_secs = options.prune_interval.as_secs(),
            "Creating flush worker"
        );

        let worker = Self {
            controller,
            options,
            commands,
            connectivity: None,
            shutdown,
        };
        let handle = FlushHandle {
            tx,
            background_budget: options.background_budget,
        };

        (worker, handle)
    }

    /// Subscribes to device condition changes to detect reconnects
    pub fn with_connectivity(mut self, rx: watch::Receiver<DeviceConditions>) -> Self {
        self.connectivity = Some(rx);
        self
    }

    /// Main event loop
    ///
    /// Runs until the shutdown token is cancelled. Prunes once at startup,
    /// then reacts to whichever of these fires first:
    ///
    /// 1. **Shutdown**: the cancellation token
    /// 2. **Timer**: the periodic interval of the current mode
    /// 3. **Critical**: a `Critical` record was enqueued
    /// 4. **Prune**: the queue exceeded its limits, or the maintenance timer
    /// 5. **Commands**: requests from [`FlushHandle`]s
    /// 6. **Connectivity**: an offline to online transition
    pub async fn run(self) {
        let FlushWorker {
            controller,
            options,
            mut commands,
            mut connectivity,
            shutdown,
        } = self;

        info!("Flush worker starting");

        let signals = controller.queue().signals();
        controller.prune("startup").await;

        let mut prune_timer = tokio::time::interval_at(
            Instant::now() + options.prune_interval,
            options.prune_interval,
        );
        let mut last_flush = Instant::now();
        let mut online = controller.monitor().evaluate().online;
        let mut commands_open = true;

        loop {
            let mode = controller.monitor().evaluate().mode;
            let deadline = options.intervals.for_mode(mode).map(|i| last_flush + i);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, flush worker stopping");
                    break;
                }

                _ = sleep_until(deadline) => {
                    if run_or_cancel(&controller, FlushTrigger::Timer, &shutdown).await.is_none() {
                        break;
                    }
                    last_flush = Instant::now();
                }

                _ = signals.critical_enqueued() => {
                    debug!("Critical event enqueued, flushing immediately");
                    if run_or_cancel(&controller, FlushTrigger::Critical, &shutdown).await.is_none() {
                        break;
                    }
                    last_flush = Instant::now();
                }

                _ = signals.prune_needed() => {
                    controller.prune("limits").await;
                }

                _ = prune_timer.tick() => {
                    controller.prune("interval").await;
                }

                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => {
                            match handle_command(&controller, &options, command, &shutdown).await {
                                CommandOutcome::Ran => last_flush = Instant::now(),
                                CommandOutcome::Skipped => {}
                                CommandOutcome::Cancelled => break,
                            }
                        }
                        None => {
                            debug!("All flush handles dropped");
                            commands_open = false;
                        }
                    }
                }

                changed = next_conditions(&mut connectivity) => {
                    match changed {
                        Some(conditions) => {
                            let now_online = conditions.connectivity.is_online();
                            if now_online && !online {
                                info!(
                                    connectivity = %conditions.connectivity,
                                    "Connectivity restored, flushing"
                                );
                                let trigger = FlushTrigger::ConnectivityRestored;
                                if run_or_cancel(&controller, trigger, &shutdown).await.is_none() {
                                    break;
                                }
                                last_flush = Instant::now();
                            }
                            online = now_online;
                        }
                        None => {
                            warn!("Device condition channel closed, reconnect detection disabled");
                            connectivity = None;
                        }
                    }
                }
            }
        }

        info!("Flush worker stopped");
    }
}

/// Runs one cycle unless the shutdown token fires first
async fn run_or_cancel(
    controller: &FlushController,
    trigger: FlushTrigger,
    shutdown: &CancellationToken,
) -> Option<FlushReport> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!(trigger = %trigger, "Shutdown during flush cycle, abandoning it");
            None
        }
        report = controller.run_cycle(trigger) => Some(report),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandOutcome {
    Ran,
    /// Nobody is waiting for the answer any more
    Skipped,
    Cancelled,
}

async fn handle_command(
    controller: &FlushController,
    options: &WorkerOptions,
    command: FlushCommand,
    shutdown: &CancellationToken,
) -> CommandOutcome {
    match command {
        FlushCommand::FlushNow { reply } => {
            if reply.as_ref().is_some_and(|r| r.is_closed()) {
                debug!("Flush requester gone, skipping");
                return CommandOutcome::Skipped;
            }
            let Some(report) = run_or_cancel(controller, FlushTrigger::Manual, shutdown).await
            else {
                return CommandOutcome::Cancelled;
            };
            if let Some(reply) = reply {
                let _ = reply.send(Ok(report));
            }
            CommandOutcome::Ran
        }
        FlushCommand::Foreground => {
            match run_or_cancel(controller, FlushTrigger::Foreground, shutdown).await {
                Some(_) => CommandOutcome::Ran,
                None => CommandOutcome::Cancelled,
            }
        }
        FlushCommand::Background { reply, deadline } => {
            if reply.is_closed() || Instant::now() >= deadline {
                debug!("Background flush request expired, skipping");
                return CommandOutcome::Skipped;
            }
            let budget = options.background_budget;
            let cycle = run_or_cancel(controller, FlushTrigger::Background, shutdown);
            let result = match tokio::time::timeout_at(deadline, cycle).await {
                Ok(Some(report)) => Ok(report),
                // Dropping the reply reports WorkerStopped to the caller
                Ok(None) => return CommandOutcome::Cancelled,
                Err(_) => {
                    warn!(
                        budget_ms = budget.as_millis() as u64,
                        "Background flush interrupted"
                    );
                    Err(FlushError::BudgetExceeded(budget))
                }
            };
            let _ = reply.send(result);
            CommandOutcome::Ran
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Waits for the next published device conditions
///
/// Returns `None` once the publisher is gone; pends forever when no
/// channel is attached.
async fn next_conditions(
    rx: &mut Option<watch::Receiver<DeviceConditions>>,
) -> Option<DeviceConditions> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => pending().await,
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_until_none_never_completes() {
        let result = tokio::time::timeout(Duration::from_millis(20), sleep_until(None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sleep_until_past_deadline_completes() {
        let deadline = Instant::now();
        tokio::time::timeout(Duration::from_millis(100), sleep_until(Some(deadline)))
            .await
            .expect("past deadline should complete");
    }

    #[tokio::test]
    async fn test_next_conditions_reports_closed_channel() {
        let (tx, rx) = watch::channel(DeviceConditions::default());
        let mut rx = Some(rx);
        drop(tx);
        assert!(next_conditions(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_next_conditions_returns_latest_value() {
        let (tx, rx) = watch::channel(DeviceConditions::default());
        let mut rx = Some(rx);
        tx.send(DeviceConditions::default().with_battery(15)).unwrap();
        let conditions = next_conditions(&mut rx).await.unwrap();
        assert_eq!(conditions.battery_percent, Some(15));
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_worker() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = FlushHandle {
            tx,
            background_budget: Duration::from_millis(50),
        };
        assert!(matches!(handle.request_flush(), Err(FlushError::WorkerStopped)));
        assert!(matches!(handle.flush_now().await, Err(FlushError::WorkerStopped)));
        assert!(matches!(
            handle.app_background().await,
            Err(FlushError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn test_app_background_sends_its_deadline() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = FlushHandle {
            tx,
            background_budget: Duration::from_millis(50),
        };
        let before = Instant::now();
        let result = handle.app_background().await;
        assert!(matches!(result, Err(FlushError::BudgetExceeded(_))));

        match rx.recv().await {
            Some(FlushCommand::Background { reply, deadline }) => {
                assert!(reply.is_closed());
                assert!(deadline >= before + Duration::from_millis(50));
                assert!(deadline <= Instant::now());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_worker_options_from_config() {
        let options = WorkerOptions::default();
        assert_eq!(options.prune_interval, Duration::from_secs(3600));
        assert_eq!(options.background_budget, Duration::from_secs(5));
        assert_eq!(options.intervals, FlushIntervals::default());
    }
}
