//! Experiment Design - immutable description of an experiment

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::condition::{MAX_RISK_LEVEL, MIN_RISK_LEVEL};
use super::{Condition, Metric};
use crate::{Error, Result};

/// Default target samples per condition
pub const DEFAULT_SAMPLE_SIZE_PER_CONDITION: usize = 100;

/// Default minimum runtime (1 hour)
pub const DEFAULT_MINIMUM_RUNTIME: Duration = Duration::from_secs(60 * 60);

/// Default maximum runtime (24 hours)
pub const DEFAULT_MAXIMUM_RUNTIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Kind of experiment, serialized as its upper-case tag (`"AB_TEST"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentKind {
    /// Control vs. one treatment
    AbTest,
    /// Several treatments at once
    Multivariate,
    /// Conditions evaluated one after another
    Sequential,
    /// Small traffic share on the new configuration
    Canary,
    /// Current best against a challenger
    ChampionChallenger,
    /// Factor combinations
    Factorial,
    /// Guarding against regressions of an existing optimization
    Regression,
}

impl ExperimentKind {
    /// Durable string tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AbTest => "AB_TEST",
            Self::Multivariate => "MULTIVARIATE",
            Self::Sequential => "SEQUENTIAL",
            Self::Canary => "CANARY",
            Self::ChampionChallenger => "CHAMPION_CHALLENGER",
            Self::Factorial => "FACTORIAL",
            Self::Regression => "REGRESSION",
        }
    }
}

impl std::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experiment Design - created once, never mutated.
///
/// Designs are only produced by [`ExperimentDesignBuilder::build`], which
/// validates them, or by deserializing a stored design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentDesign {
    experiment_id: String,
    name: String,
    description: String,
    kind: ExperimentKind,
    conditions: Vec<Condition>,
    metrics: Vec<Metric>,
    primary_metric: String,
    sample_size_per_condition: usize,
    minimum_runtime: Duration,
    maximum_runtime: Duration,
    confidence_level: f64,
    minimum_detectable_effect: f64,
    max_regression_threshold: f64,
    rollback_threshold: f64,
    early_stopping_enabled: bool,
    created_at: DateTime<Utc>,
}

impl ExperimentDesign {
    /// Create a builder for a design with the given name and kind.
    #[must_use]
    pub fn builder(name: impl Into<String>, kind: ExperimentKind) -> ExperimentDesignBuilder {
        ExperimentDesignBuilder::new(name, kind)
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the experiment kind.
    #[must_use]
    pub const fn kind(&self) -> ExperimentKind {
        self.kind
    }

    /// Conditions in declaration order (the first is the control).
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Look up a condition by ID.
    #[must_use]
    pub fn condition(&self, condition_id: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_id() == condition_id)
    }

    /// Declared metrics.
    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Look up a metric by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name() == name)
    }

    /// Name of the primary metric.
    #[must_use]
    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    /// Target samples per condition.
    #[must_use]
    pub const fn sample_size_per_condition(&self) -> usize {
        self.sample_size_per_condition
    }

    /// Target samples across all conditions.
    #[must_use]
    pub fn target_total_samples(&self) -> usize {
        self.sample_size_per_condition * self.conditions.len()
    }

    /// Runtime before which target-sample termination is not allowed.
    #[must_use]
    pub const fn minimum_runtime(&self) -> Duration {
        self.minimum_runtime
    }

    /// Runtime after which the experiment is forcibly stopped.
    #[must_use]
    pub const fn maximum_runtime(&self) -> Duration {
        self.maximum_runtime
    }

    /// Confidence level (e.g., 0.95).
    #[must_use]
    pub const fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Smallest fractional effect worth detecting.
    #[must_use]
    pub const fn minimum_detectable_effect(&self) -> f64 {
        self.minimum_detectable_effect
    }

    /// Largest tolerated fractional regression.
    #[must_use]
    pub const fn max_regression_threshold(&self) -> f64 {
        self.max_regression_threshold
    }

    /// Fractional regression that triggers an early rollback.
    #[must_use]
    pub const fn rollback_threshold(&self) -> f64 {
        self.rollback_threshold
    }

    /// Whether interim data may stop the experiment early.
    #[must_use]
    pub const fn early_stopping_enabled(&self) -> bool {
        self.early_stopping_enabled
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Check every structural rule a design must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("design name must not be empty"));
        }
        if self.conditions.len() < 2 {
            return Err(invalid(format!(
                "a design needs at least 2 conditions, got {}",
                self.conditions.len()
            )));
        }

        let mut seen = HashSet::new();
        for condition in &self.conditions {
            if condition.condition_id().trim().is_empty() {
                return Err(invalid("condition ids must not be empty"));
            }
            if !seen.insert(condition.condition_id()) {
                return Err(invalid(format!(
                    "duplicate condition id '{}'",
                    condition.condition_id()
                )));
            }
            if !(MIN_RISK_LEVEL..=MAX_RISK_LEVEL).contains(&condition.risk_level()) {
                return Err(invalid(format!(
                    "condition '{}' has risk level {}, expected {MIN_RISK_LEVEL}-{MAX_RISK_LEVEL}",
                    condition.condition_id(),
                    condition.risk_level()
                )));
            }
        }

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.name()) {
                return Err(invalid(format!("duplicate metric name '{}'", metric.name())));
            }
        }
        if self.metric(&self.primary_metric).is_none() {
            return Err(invalid(format!(
                "primary metric '{}' is not one of the declared metrics",
                self.primary_metric
            )));
        }

        if self.sample_size_per_condition == 0 {
            return Err(invalid("sample_size_per_condition must be positive"));
        }
        if self.minimum_runtime > self.maximum_runtime {
            return Err(invalid(format!(
                "minimum runtime {:?} exceeds maximum runtime {:?}",
                self.minimum_runtime, self.maximum_runtime
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(invalid(format!(
                "confidence level {} must lie in (0, 1)",
                self.confidence_level
            )));
        }
        for (field, value) in [
            ("minimum_detectable_effect", self.minimum_detectable_effect),
            ("max_regression_threshold", self.max_regression_threshold),
            ("rollback_threshold", self.rollback_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{field} must be a non-negative number")));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

/// Generate a globally unique experiment ID: UTC timestamp plus random suffix.
#[must_use]
pub fn generate_experiment_id() -> String {
    format!(
        "exp_{}_{:08x}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}

/// Builder for `ExperimentDesign`.
///
/// Defaults: 100 samples per condition, 1 h minimum and 24 h maximum
/// runtime, 0.95 confidence, 0.05 minimum detectable effect, 0.10 maximum
/// regression, 0.05 rollback threshold, early stopping enabled.
#[derive(Debug)]
pub struct ExperimentDesignBuilder {
    design: ExperimentDesign,
}

impl ExperimentDesignBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ExperimentKind) -> Self {
        Self {
            design: ExperimentDesign {
                experiment_id: String::new(),
                name: name.into(),
                description: String::new(),
                kind,
                conditions: Vec::new(),
                metrics: Vec::new(),
                primary_metric: String::new(),
                sample_size_per_condition: DEFAULT_SAMPLE_SIZE_PER_CONDITION,
                minimum_runtime: DEFAULT_MINIMUM_RUNTIME,
                maximum_runtime: DEFAULT_MAXIMUM_RUNTIME,
                confidence_level: 0.95,
                minimum_detectable_effect: 0.05,
                max_regression_threshold: 0.10,
                rollback_threshold: 0.05,
                early_stopping_enabled: true,
                created_at: Utc::now(),
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.design.description = description.into();
        self
    }

    /// Append a condition (the first one added is the control).
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.design.conditions.push(condition);
        self
    }

    /// Append a metric.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.design.metrics.push(metric);
        self
    }

    /// Set the primary metric by name.
    #[must_use]
    pub fn primary_metric(mut self, name: impl Into<String>) -> Self {
        self.design.primary_metric = name.into();
        self
    }

    /// Set the target samples per condition.
    #[must_use]
    pub const fn sample_size_per_condition(mut self, samples: usize) -> Self {
        self.design.sample_size_per_condition = samples;
        self
    }

    /// Set the minimum runtime.
    #[must_use]
    pub const fn minimum_runtime(mut self, runtime: Duration) -> Self {
        self.design.minimum_runtime = runtime;
        self
    }

    /// Set the maximum runtime.
    #[must_use]
    pub const fn maximum_runtime(mut self, runtime: Duration) -> Self {
        self.design.maximum_runtime = runtime;
        self
    }

    /// Set the confidence level.
    #[must_use]
    pub const fn confidence_level(mut self, level: f64) -> Self {
        self.design.confidence_level = level;
        self
    }

    /// Set the minimum detectable effect.
    #[must_use]
    pub const fn minimum_detectable_effect(mut self, effect: f64) -> Self {
        self.design.minimum_detectable_effect = effect;
        self
    }

    /// Set the maximum tolerated regression.
    #[must_use]
    pub const fn max_regression_threshold(mut self, threshold: f64) -> Self {
        self.design.max_regression_threshold = threshold;
        self
    }

    /// Set the rollback threshold.
    #[must_use]
    pub const fn rollback_threshold(mut self, threshold: f64) -> Self {
        self.design.rollback_threshold = threshold;
        self
    }

    /// Enable or disable early stopping.
    #[must_use]
    pub const fn early_stopping(mut self, enabled: bool) -> Self {
        self.design.early_stopping_enabled = enabled;
        self
    }

    /// Set a custom creation timestamp (useful for testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.design.created_at = created_at;
        self
    }

    /// Validate and build the `ExperimentDesign` under a freshly generated ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the design is malformed.
    pub fn build(self) -> Result<ExperimentDesign> {
        self.build_with_id(generate_experiment_id())
    }

    /// Validate and build the `ExperimentDesign` under the given ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the design is malformed or the ID is empty.
    pub fn build_with_id(mut self, experiment_id: impl Into<String>) -> Result<ExperimentDesign> {
        self.design.experiment_id = experiment_id.into();
        if self.design.experiment_id.trim().is_empty() {
            return Err(invalid("experiment id must not be empty"));
        }
        self.design.validate()?;
        Ok(self.design)
    }
}
