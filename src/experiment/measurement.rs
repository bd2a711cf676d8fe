//! Measurement - one observed metric value for one condition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement Record represents a single observed value.
///
/// Measurements are append-only: they are never updated or deleted while
/// their experiment runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    measurement_id: String,
    condition_id: String,
    metric_name: String,
    value: f64,
    timestamp: DateTime<Utc>,
    context: BTreeMap<String, serde_json::Value>,
}

impl Measurement {
    /// Create a new measurement stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `measurement_id` - Unique identifier within the experiment
    /// * `condition_id` - Condition the value was observed under
    /// * `metric_name` - Metric the value belongs to
    /// * `value` - Observed value
    #[must_use]
    pub fn new(
        measurement_id: impl Into<String>,
        condition_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            condition_id: condition_id.into(),
            metric_name: metric_name.into(),
            value,
            timestamp: Utc::now(),
            context: BTreeMap::new(),
        }
    }

    /// Attach free-form context (host, region, build, ...).
    #[must_use]
    pub fn with_context(mut self, context: BTreeMap<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get the measurement ID.
    #[must_use]
    pub fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    /// Get the condition ID.
    #[must_use]
    pub fn condition_id(&self) -> &str {
        &self.condition_id
    }

    /// Get the metric name.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Get the observed value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the value was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the context map.
    #[must_use]
    pub const fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }
}
