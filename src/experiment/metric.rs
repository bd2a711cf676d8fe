//! Metric - a measured quantity declared by a design

use serde::{Deserialize, Serialize};

/// Metric declared by an experiment design.
///
/// Names are unique within a design; one of them is the design's primary
/// metric, which decides the statistical outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    name: String,
    description: String,
    unit: String,
    higher_is_better: bool,
    baseline_value: Option<f64>,
    target_improvement: Option<f64>,
}

impl Metric {
    /// Create a metric where higher values are better.
    ///
    /// # Arguments
    ///
    /// * `name` - Metric name (e.g., "throughput", "p99_latency")
    /// * `unit` - Measurement unit (e.g., "req/s", "ms")
    #[must_use]
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::builder(name, unit).build()
    }

    /// Create a builder for constructing a metric with optional fields.
    #[must_use]
    pub fn builder(name: impl Into<String>, unit: impl Into<String>) -> MetricBuilder {
        MetricBuilder::new(name, unit)
    }

    /// Get the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the unit.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Whether larger values are an improvement.
    #[must_use]
    pub const fn higher_is_better(&self) -> bool {
        self.higher_is_better
    }

    /// Known baseline value, if any.
    #[must_use]
    pub const fn baseline_value(&self) -> Option<f64> {
        self.baseline_value
    }

    /// Targeted fractional improvement (0.1 = 10%), if any.
    #[must_use]
    pub const fn target_improvement(&self) -> Option<f64> {
        self.target_improvement
    }
}

/// Builder for `Metric`.
#[derive(Debug)]
pub struct MetricBuilder {
    metric: Metric,
}

impl MetricBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            metric: Metric {
                name: name.into(),
                description: String::new(),
                unit: unit.into(),
                higher_is_better: true,
                baseline_value: None,
                target_improvement: None,
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metric.description = description.into();
        self
    }

    /// Set whether larger values are better.
    #[must_use]
    pub const fn higher_is_better(mut self, higher_is_better: bool) -> Self {
        self.metric.higher_is_better = higher_is_better;
        self
    }

    /// Set the known baseline value.
    #[must_use]
    pub const fn baseline_value(mut self, value: f64) -> Self {
        self.metric.baseline_value = Some(value);
        self
    }

    /// Set the targeted fractional improvement.
    #[must_use]
    pub const fn target_improvement(mut self, fraction: f64) -> Self {
        self.metric.target_improvement = Some(fraction);
        self
    }

    /// Build the `Metric`.
    #[must_use]
    pub fn build(self) -> Metric {
        self.metric
    }
}
