//! Running Experiment - the live, mutable state of a started experiment

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentDesign, Measurement};

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// Design stored, never started (or not running right now).
    Designed,
    /// Collecting measurements.
    Running,
    /// Stopped and analyzed.
    Completed,
    /// Stopped without analysis.
    Aborted,
}

/// Measurements grouped as `condition_id -> metric_name -> values`.
pub type GroupedSamples = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

/// Running Experiment represents one active execution of a design.
///
/// The measurement log is append-only and every condition's sample count
/// equals the number of logged measurements for that condition.
#[derive(Debug, Clone)]
pub struct RunningExperiment {
    design: Arc<ExperimentDesign>,
    status: ExperimentStatus,
    started_at: DateTime<Utc>,
    measurements: Vec<Measurement>,
    sample_counts: BTreeMap<String, usize>,
    /// `(count, sum)` of primary-metric values per condition
    primary_totals: BTreeMap<String, (usize, f64)>,
    early_stop_triggered: bool,
    rollback_triggered: bool,
}

impl RunningExperiment {
    /// Start a run of `design` now, with every condition at zero samples.
    #[must_use]
    pub fn start(design: Arc<ExperimentDesign>) -> Self {
        Self::start_at(design, Utc::now())
    }

    /// Start a run of `design` at an explicit instant.
    #[must_use]
    pub fn start_at(design: Arc<ExperimentDesign>, started_at: DateTime<Utc>) -> Self {
        let sample_counts = design
            .conditions()
            .iter()
            .map(|c| (c.condition_id().to_string(), 0))
            .collect();
        Self {
            design,
            status: ExperimentStatus::Running,
            started_at,
            measurements: Vec::new(),
            sample_counts,
            primary_totals: BTreeMap::new(),
            early_stop_triggered: false,
            rollback_triggered: false,
        }
    }

    /// Get the design being run.
    #[must_use]
    pub fn design(&self) -> &Arc<ExperimentDesign> {
        &self.design
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        self.design.experiment_id()
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Runtime at `now`, zero if `now` precedes the start.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    /// Logged measurements in arrival order.
    #[must_use]
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Per-condition sample counts.
    #[must_use]
    pub const fn sample_counts(&self) -> &BTreeMap<String, usize> {
        &self.sample_counts
    }

    /// Total samples across all conditions.
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.sample_counts.values().sum()
    }

    /// Whether early stopping has fired.
    #[must_use]
    pub const fn early_stop_triggered(&self) -> bool {
        self.early_stop_triggered
    }

    /// Whether a harmful regression demanded a rollback.
    #[must_use]
    pub const fn rollback_triggered(&self) -> bool {
        self.rollback_triggered
    }

    /// Append a measurement for a declared condition.
    ///
    /// Returns `None` (and logs nothing) when `condition_id` is not part of
    /// the design.
    pub fn record(
        &mut self,
        condition_id: &str,
        metric_name: &str,
        value: f64,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Option<&Measurement> {
        let count = self.sample_counts.get_mut(condition_id)?;
        *count += 1;
        if metric_name == self.design.primary_metric() {
            let (n, sum) = self
                .primary_totals
                .entry(condition_id.to_string())
                .or_default();
            *n += 1;
            *sum += value;
        }

        let measurement_id = format!(
            "{}-{:06}",
            self.design.experiment_id(),
            self.measurements.len() + 1
        );
        self.measurements.push(
            Measurement::new(measurement_id, condition_id, metric_name, value).with_context(context),
        );
        self.measurements.last()
    }

    /// Mean of the primary metric for one condition, `None` without data.
    ///
    /// Maintained incrementally, so this is O(1) regardless of the log length.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn primary_mean(&self, condition_id: &str) -> Option<f64> {
        self.primary_totals
            .get(condition_id)
            .filter(|(n, _)| *n > 0)
            .map(|(n, sum)| sum / *n as f64)
    }

    /// Latch the early-stop flags. Flags never reset once set.
    pub fn trigger_early_stop(&mut self, rollback: bool) {
        self.early_stop_triggered = true;
        self.rollback_triggered |= rollback;
    }

    /// Values of the primary metric per condition, for conditions that have any.
    #[must_use]
    pub fn primary_metric_samples(&self) -> BTreeMap<String, Vec<f64>> {
        let primary = self.design.primary_metric();
        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for m in self.measurements.iter().filter(|m| m.metric_name() == primary) {
            groups
                .entry(m.condition_id().to_string())
                .or_default()
                .push(m.value());
        }
        groups
    }

    /// All values grouped by condition, then metric.
    #[must_use]
    pub fn grouped_samples(&self) -> GroupedSamples {
        let mut grouped = GroupedSamples::new();
        for m in &self.measurements {
            grouped
                .entry(m.condition_id().to_string())
                .or_default()
                .entry(m.metric_name().to_string())
                .or_default()
                .push(m.value());
        }
        grouped
    }
}
