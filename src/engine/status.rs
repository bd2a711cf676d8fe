//! Status views returned by `get_status` and `list_all`

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::experiment::{
    ExperimentDesign, ExperimentKind, ExperimentStatus, Outcome, ResultSummary, RunningExperiment,
};

/// Live view of a running experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStatus {
    /// Experiment id
    pub experiment_id: String,
    /// Design name
    pub name: String,
    /// Design kind
    pub kind: ExperimentKind,
    /// Always `Running`
    pub status: ExperimentStatus,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Runtime so far
    pub elapsed: Duration,
    /// Samples per condition
    pub sample_counts: BTreeMap<String, usize>,
    /// Samples across all conditions
    pub total_samples: usize,
    /// Target samples across all conditions
    pub target_samples: usize,
    /// Early stop latched
    pub early_stop_triggered: bool,
    /// Rollback latched
    pub rollback_triggered: bool,
}

impl RunningStatus {
    pub(crate) fn capture(run: &RunningExperiment, now: DateTime<Utc>) -> Self {
        let design = run.design();
        Self {
            experiment_id: run.experiment_id().to_string(),
            name: design.name().to_string(),
            kind: design.kind(),
            status: run.status(),
            started_at: run.started_at(),
            elapsed: run.elapsed(now),
            sample_counts: run.sample_counts().clone(),
            total_samples: run.total_samples(),
            target_samples: design.target_total_samples(),
            early_stop_triggered: run.early_stop_triggered(),
            rollback_triggered: run.rollback_triggered(),
        }
    }

    /// Fraction of the target sample count collected, capped at 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        if self.target_samples == 0 {
            return 1.0;
        }
        (self.total_samples as f64 / self.target_samples as f64).min(1.0)
    }
}

/// Answer to `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusView {
    /// The experiment is collecting measurements
    Running(RunningStatus),
    /// The experiment has finished; summary of its stored results
    Completed(ResultSummary),
}

impl StatusView {
    /// Lifecycle status represented by this view.
    #[must_use]
    pub fn status(&self) -> ExperimentStatus {
        match self {
            Self::Running(running) => running.status,
            Self::Completed(summary) => completed_status(summary.outcome),
        }
    }

    /// Total samples collected (so far, or over the whole run).
    #[must_use]
    pub const fn total_samples(&self) -> usize {
        match self {
            Self::Running(running) => running.total_samples,
            Self::Completed(summary) => summary.total_samples,
        }
    }
}

/// Status of a finished experiment with the given outcome.
pub(crate) const fn completed_status(outcome: Outcome) -> ExperimentStatus {
    match outcome {
        Outcome::Failure => ExperimentStatus::Aborted,
        _ => ExperimentStatus::Completed,
    }
}

/// One stored design and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSummary {
    /// Experiment id
    pub experiment_id: String,
    /// Design name
    pub name: String,
    /// Design kind
    pub kind: ExperimentKind,
    /// Designed, running or finished
    pub status: ExperimentStatus,
    /// Number of conditions
    pub condition_count: usize,
    /// Primary metric name
    pub primary_metric: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl DesignSummary {
    pub(crate) fn new(design: &ExperimentDesign, status: ExperimentStatus) -> Self {
        Self {
            experiment_id: design.experiment_id().to_string(),
            name: design.name().to_string(),
            kind: design.kind(),
            status,
            condition_count: design.conditions().len(),
            primary_metric: design.primary_metric().to_string(),
            created_at: design.created_at(),
        }
    }
}

/// Answer to `list_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentListing {
    /// Running experiments, oldest start first
    pub running: Vec<RunningStatus>,
    /// Finished experiments, most recent first
    pub completed: Vec<ResultSummary>,
    /// Every stored design, oldest first
    pub designs: Vec<DesignSummary>,
}
