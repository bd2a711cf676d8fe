//! Background Monitor - enforces runtime and sample budgets
//!
//! A cancellable tokio task ticks at the configured interval and runs one
//! scan per tick on the blocking pool. It is spawned when the first
//! experiment starts and shut down once the registry drains.

use std::sync::{Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{reasons, EngineInner, ExperimentEngine};
use crate::experiment::RunningExperiment;

/// Budget check for one running experiment at `now`.
///
/// Returns the stop reason when a budget is exhausted: maximum runtime first,
/// then target samples once the minimum runtime has passed.
#[must_use]
pub fn due_stop_reason(run: &RunningExperiment, now: DateTime<Utc>) -> Option<&'static str> {
    let design = run.design();
    let elapsed = run.elapsed(now);
    if elapsed >= design.maximum_runtime() {
        Some(reasons::MAXIMUM_RUNTIME_REACHED)
    } else if run.total_samples() >= design.target_total_samples()
        && elapsed >= design.minimum_runtime()
    {
        Some(reasons::TARGET_SAMPLES_REACHED)
    } else {
        None
    }
}

/// What one monitor scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Experiments inspected
    pub scanned: usize,
    /// `(experiment_id, reason)` of experiments stopped by this scan
    pub stopped: Vec<(String, String)>,
    /// `(experiment_id, error)` of experiments that could not be stopped
    pub failures: Vec<(String, String)>,
}

struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner of the (at most one) monitor task.
pub(crate) struct Monitor {
    interval: Duration,
    runtime: Option<Handle>,
    slot: Mutex<Option<MonitorHandle>>,
}

impl Monitor {
    pub(crate) fn new(interval: Duration, runtime: Option<Handle>) -> Self {
        Self {
            interval,
            runtime,
            slot: Mutex::new(None),
        }
    }

    /// Whether a monitor task is alive.
    pub(crate) fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Spawn the task unless one is alive. No-op without a tokio runtime.
    pub(crate) fn ensure_running(&self, engine: Weak<EngineInner>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return;
        }
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!("no tokio runtime available; background monitor not started");
            return;
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(run(engine, self.interval, shutdown_rx));
        info!(interval_secs = self.interval.as_secs_f64(), "background monitor started");
        *slot = Some(MonitorHandle { shutdown, task });
    }

    /// Signal the task to exit if `should_stop` holds while the slot is locked.
    pub(crate) fn stop_if(&self, should_stop: impl FnOnce() -> bool) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() || !should_stop() {
            return;
        }
        if let Some(handle) = slot.take() {
            // The receiver is gone if the task already exited.
            let _ = handle.shutdown.send(true);
            info!("background monitor stopped");
        }
    }
}

async fn run(engine: Weak<EngineInner>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }

        let Some(inner) = engine.upgrade() else {
            break;
        };
        let engine = ExperimentEngine::from_inner(inner);
        let scan = tokio::task::spawn_blocking(move || engine.run_monitor_scan(Utc::now())).await;
        match scan {
            Ok(report) if !report.stopped.is_empty() || !report.failures.is_empty() => {
                info!(
                    scanned = report.scanned,
                    stopped = report.stopped.len(),
                    failures = report.failures.len(),
                    "monitor scan finished"
                );
            }
            Ok(report) => debug!(scanned = report.scanned, "monitor scan finished"),
            Err(e) => warn!(error = %e, "monitor scan panicked; continuing"),
        }
    }
    debug!("background monitor exiting");
}
