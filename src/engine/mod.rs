//! Lifecycle Controller
//!
//! [`ExperimentEngine`] owns the Experiment Store, the Experiment Registry
//! and the Background Monitor, and exposes the experiment operations:
//! create, start, record, stop, abort, status and listing.
//!
//! ## Locking discipline
//!
//! - The registry locks per entry: calls on different experiment ids never
//!   block each other, and `start`, `record_measurement` and `stop` on the same
//!   id are serialized.
//! - `stop` removes the entry under its lock before analyzing it, so no
//!   measurement can be recorded after the data has been frozen. The id stays
//!   blocked for `start` until its results are stored.
//! - The store sits behind its own `RwLock`. `start` reads it under a registry
//!   entry lock, so the registry is never locked while the store is held.
//!
//! ## Usage
//!
//! ```rust
//! use optimization_lab::engine::ExperimentEngine;
//! use optimization_lab::experiment::{Condition, ExperimentDesign, ExperimentKind, Metric};
//!
//! let engine = ExperimentEngine::in_memory();
//! let design = engine.create_design(
//!     ExperimentDesign::builder("query cache", ExperimentKind::AbTest)
//!         .condition(Condition::new("control", "cache off"))
//!         .condition(Condition::new("treatment", "cache on"))
//!         .metric(Metric::new("qps", "queries/s"))
//!         .primary_metric("qps")
//!         .early_stopping(false),
//! )?;
//! let id = design.experiment_id();
//!
//! engine.start(id)?;
//! for (control, treatment) in [(100.0, 120.0), (101.0, 119.0), (99.0, 121.0)] {
//!     engine.record_measurement(id, "control", "qps", control);
//!     engine.record_measurement(id, "treatment", "qps", treatment);
//! }
//! let results = engine.stop(id, "manual_stop")?;
//! assert_eq!(results.best_condition.as_deref(), Some("treatment"));
//! # Ok::<(), optimization_lab::Error>(())
//! ```

mod evaluation;
mod insights;
mod monitor;
mod registry;
mod status;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisResult;
use crate::config::EngineConfig;
use crate::experiment::{
    ExperimentDesign, ExperimentDesignBuilder, ExperimentResults, ExperimentStatus,
    ExperimentStore, RunningExperiment,
};
use crate::{Error, Result};

pub use evaluation::{analyze, detects_harmful_regression, ensure_analyzable};
pub use insights::{lessons_learned, next_experiments};
pub use monitor::{due_stop_reason, MonitorReport};
pub use registry::ExperimentRegistry;
pub use status::{DesignSummary, ExperimentListing, RunningStatus, StatusView};

use monitor::Monitor;

/// Stop reasons recorded in results.
pub mod reasons {
    /// Early stopping found a regression beyond the rollback threshold
    pub const HARMFUL_REGRESSION_DETECTED: &str = "harmful_regression_detected";
    /// The monitor found the maximum runtime exhausted
    pub const MAXIMUM_RUNTIME_REACHED: &str = "maximum_runtime_reached";
    /// The monitor found the sample target met after the minimum runtime
    pub const TARGET_SAMPLES_REACHED: &str = "target_samples_reached";
    /// Stopped by an operator
    pub const MANUAL_STOP: &str = "manual_stop";
}

pub(crate) struct EngineInner {
    config: EngineConfig,
    store: RwLock<ExperimentStore>,
    registry: ExperimentRegistry,
    monitor: Monitor,
}

/// Optimization experiment engine (cheaply cloneable handle).
#[derive(Clone)]
pub struct ExperimentEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ExperimentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentEngine")
            .field("config", &self.inner.config)
            .field("running", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl ExperimentEngine {
    /// Open an engine, loading designs and results from `config.data_dir`.
    ///
    /// The background monitor runs on the tokio runtime current at this
    /// call, or on the one current when the first experiment starts.
    ///
    /// # Errors
    ///
    /// Returns an error if stored collections exist but cannot be read.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = ExperimentStore::from_config(&config)?;
        Ok(Self::with_store(config, store))
    }

    /// Engine that keeps everything in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(EngineConfig::in_memory(), ExperimentStore::new())
    }

    /// Engine over an already opened store.
    #[must_use]
    pub fn with_store(config: EngineConfig, store: ExperimentStore) -> Self {
        let monitor = Monitor::new(config.monitor_interval, Handle::try_current().ok());
        Self {
            inner: Arc::new(EngineInner {
                config,
                store: RwLock::new(store),
                registry: ExperimentRegistry::new(),
                monitor,
            }),
        }
    }

    pub(crate) const fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn store(&self) -> RwLockReadGuard<'_, ExperimentStore> {
        self.inner.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_mut(&self) -> RwLockWriteGuard<'_, ExperimentStore> {
        self.inner.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, store and persist a new design.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed design, or
    /// [`Error::Persistence`] if it was stored in memory but not written.
    pub fn create_design(&self, builder: ExperimentDesignBuilder) -> Result<ExperimentDesign> {
        self.store_mut().create_design(builder)
    }

    /// Stored design by id.
    #[must_use]
    pub fn get_design(&self, experiment_id: &str) -> Option<ExperimentDesign> {
        self.store().get_design(experiment_id).cloned()
    }

    /// Stored results by id.
    #[must_use]
    pub fn get_result(&self, experiment_id: &str) -> Option<ExperimentResults> {
        self.store().get_result(experiment_id).cloned()
    }

    /// Start collecting measurements for a stored design.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] without a design, [`Error::AlreadyRunning`]
    /// if the experiment is running, or [`Error::Validation`] if it is being
    /// stopped or already has (immutable) results.
    pub fn start(&self, experiment_id: &str) -> Result<RunningExperiment> {
        let design = self
            .store()
            .get_design(experiment_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(experiment_id.to_string()))?;

        let run = RunningExperiment::start(Arc::new(design));
        self.inner.registry.insert_new(run.clone(), || {
            if self.store().get_result(experiment_id).is_some() {
                return Err(Error::Validation(format!(
                    "experiment {experiment_id} already completed; create a new design to re-run it"
                )));
            }
            Ok(())
        })?;
        info!(
            experiment_id,
            conditions = run.sample_counts().len(),
            "experiment started"
        );

        self.inner.monitor.ensure_running(Arc::downgrade(&self.inner));
        Ok(run)
    }

    /// Record one measurement; see [`record_measurement_with_context`](Self::record_measurement_with_context).
    pub fn record_measurement(
        &self,
        experiment_id: &str,
        condition_id: &str,
        metric_name: &str,
        value: f64,
    ) -> bool {
        self.record_measurement_with_context(
            experiment_id,
            condition_id,
            metric_name,
            value,
            BTreeMap::new(),
        )
    }

    /// Record one measurement with free-form context.
    ///
    /// Returns `false` (never an error) when the experiment is not running,
    /// the condition is not part of the design, or the value is not finite.
    /// With early stopping enabled, a primary-metric measurement may stop the
    /// experiment with [`reasons::HARMFUL_REGRESSION_DETECTED`]; the
    /// measurement itself is still accepted.
    pub fn record_measurement_with_context(
        &self,
        experiment_id: &str,
        condition_id: &str,
        metric_name: &str,
        value: f64,
        context: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        if !value.is_finite() {
            debug!(experiment_id, condition_id, metric_name, "rejecting non-finite measurement");
            return false;
        }
        let floor = self.inner.config.early_stop_min_samples;

        let recorded = self.inner.registry.with_entry_mut(experiment_id, |run| {
            run.record(condition_id, metric_name, value, context)?;
            let design = run.design();
            let check = design.early_stopping_enabled()
                && metric_name == design.primary_metric()
                && !run.rollback_triggered();
            if check && detects_harmful_regression(run, floor) {
                run.trigger_early_stop(true);
                return Some(true);
            }
            Some(false)
        });

        match recorded {
            None => {
                debug!(experiment_id, "measurement ignored: experiment not running");
                false
            }
            Some(None) => {
                debug!(experiment_id, condition_id, "measurement ignored: unknown condition");
                false
            }
            Some(Some(early_stop)) => {
                if early_stop {
                    warn!(experiment_id, "harmful regression detected; stopping early");
                    if let Err(e) = self.stop(experiment_id, reasons::HARMFUL_REGRESSION_DETECTED)
                    {
                        warn!(experiment_id, error = %e, "early stop failed");
                    }
                }
                true
            }
        }
    }

    /// Stop a running experiment, analyze it and store its results.
    ///
    /// Two-condition A/B tests use the two-sample analysis; every other
    /// design uses the multivariate analysis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment is not running,
    /// [`Error::Validation`] if its primary metric lacks data (the experiment
    /// keeps running), or [`Error::Persistence`] if the results were stored in
    /// memory but not written.
    pub fn stop(&self, experiment_id: &str, reason: &str) -> Result<ExperimentResults> {
        let run = self
            .inner
            .registry
            .take_if(experiment_id, ensure_analyzable)
            .ok_or_else(|| Error::NotFound(experiment_id.to_string()))??;
        let completed_at = Utc::now();

        let results = match analyze(&run) {
            Ok((analysis, best)) => {
                evaluation::analyzed_results(&run, reason, &analysis, best, completed_at)
            }
            Err(e) => {
                warn!(experiment_id, error = %e, "analysis failed after freeze; recording failure");
                evaluation::failed_results(&run, reason, completed_at)
            }
        };
        self.finish(results)
    }

    /// Terminate a running experiment without analysis (outcome `FAILURE`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment is not running, or
    /// [`Error::Persistence`] if the results were stored in memory but not written.
    pub fn abort(&self, experiment_id: &str, reason: &str) -> Result<ExperimentResults> {
        let run = self
            .inner
            .registry
            .take(experiment_id)
            .ok_or_else(|| Error::NotFound(experiment_id.to_string()))?;
        self.finish(evaluation::failed_results(&run, reason, Utc::now()))
    }

    fn finish(&self, results: ExperimentResults) -> Result<ExperimentResults> {
        let experiment_id = results.experiment_id.clone();
        info!(
            experiment_id = %experiment_id,
            reason = %results.stop_reason,
            outcome = %results.outcome,
            significance = %results.significance,
            improvement = results.improvement_percentage,
            "experiment stopped"
        );

        let saved = self.store_mut().save_result(results.clone());
        let registry = &self.inner.registry;
        registry.release(&experiment_id);
        self.inner.monitor.stop_if(|| registry.is_empty());

        match saved {
            Ok(()) => Ok(results),
            Err(e) => {
                warn!(experiment_id = %experiment_id, error = %e, "result not persisted");
                Err(e)
            }
        }
    }

    /// Interim analysis of a running experiment, without stopping it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment is not running, or
    /// [`Error::Validation`] if its primary metric lacks data.
    pub fn peek(&self, experiment_id: &str) -> Result<AnalysisResult> {
        let run = self
            .inner
            .registry
            .with_entry(experiment_id, RunningExperiment::clone)
            .ok_or_else(|| Error::NotFound(experiment_id.to_string()))?;
        analyze(&run).map(|(analysis, _)| analysis)
    }

    /// Live status of a running experiment, or the summary of a finished one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment is neither running nor finished.
    pub fn get_status(&self, experiment_id: &str) -> Result<StatusView> {
        let now = Utc::now();
        if let Some(running) = self
            .inner
            .registry
            .with_entry(experiment_id, |run| RunningStatus::capture(run, now))
        {
            return Ok(StatusView::Running(running));
        }
        self.store()
            .get_result(experiment_id)
            .map(|result| StatusView::Completed(result.summary()))
            .ok_or_else(|| Error::NotFound(experiment_id.to_string()))
    }

    /// Running experiments, finished experiments and every stored design.
    #[must_use]
    pub fn list_all(&self) -> ExperimentListing {
        let now = Utc::now();
        let mut running = self
            .inner
            .registry
            .snapshot(|run| RunningStatus::capture(run, now));
        running.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let store = self.store();
        let completed = store
            .list_results()
            .into_iter()
            .map(ExperimentResults::summary)
            .collect();
        let designs = store
            .list_designs()
            .into_iter()
            .map(|design| {
                let id = design.experiment_id();
                let status = if running.iter().any(|r| r.experiment_id == id) {
                    ExperimentStatus::Running
                } else {
                    store.get_result(id).map_or(ExperimentStatus::Designed, |r| {
                        status::completed_status(r.outcome)
                    })
                };
                DesignSummary::new(design, status)
            })
            .collect();

        ExperimentListing {
            running,
            completed,
            designs,
        }
    }

    /// One monitor pass: stop every running experiment whose budget is exhausted.
    ///
    /// Per-experiment failures are logged and reported; the scan always
    /// covers every experiment. An experiment out of runtime whose data
    /// cannot be analyzed is aborted.
    pub fn run_monitor_scan(&self, now: DateTime<Utc>) -> MonitorReport {
        let due = self.inner.registry.snapshot(|run| {
            (
                run.experiment_id().to_string(),
                due_stop_reason(run, now),
            )
        });

        let mut report = MonitorReport {
            scanned: due.len(),
            ..MonitorReport::default()
        };
        for (experiment_id, reason) in due {
            let Some(reason) = reason else { continue };

            let stopped = match self.stop(&experiment_id, reason) {
                Err(Error::Validation(message)) if reason == reasons::MAXIMUM_RUNTIME_REACHED => {
                    warn!(experiment_id = %experiment_id, %message, "runtime exhausted without analyzable data; aborting");
                    self.abort(&experiment_id, reason)
                }
                other => other,
            };
            match stopped {
                Ok(_) => report.stopped.push((experiment_id, reason.to_string())),
                Err(Error::NotFound(_)) => {
                    debug!(experiment_id = %experiment_id, "already stopped by another caller");
                }
                Err(e) => {
                    warn!(experiment_id = %experiment_id, reason, error = %e, "monitor could not stop experiment");
                    report.failures.push((experiment_id, e.to_string()));
                }
            }
        }
        report
    }

    /// Whether the background monitor task is alive.
    #[must_use]
    pub fn is_monitor_running(&self) -> bool {
        self.inner.monitor.is_running()
    }

    /// Stop the background monitor. Running experiments stay registered.
    pub fn shutdown(&self) {
        self.inner.monitor.stop_if(|| true);
    }

    /// Rewrite both durable collections (retry after a persistence failure).
    ///
    /// # Errors
    ///
    /// Returns an IO error if either collection cannot be written.
    pub fn flush(&self) -> Result<()> {
        self.store().flush()
    }
}
