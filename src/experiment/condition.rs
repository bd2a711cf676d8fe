//! Condition - one experimental arm

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lowest accepted risk level
pub const MIN_RISK_LEVEL: u8 = 1;

/// Highest accepted risk level
pub const MAX_RISK_LEVEL: u8 = 5;

/// Condition (arm) compared by an experiment, e.g. control vs. treatment.
///
/// The configuration map is opaque to the engine; applying it is the job of
/// the component that deploys the optimization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    condition_id: String,
    name: String,
    description: String,
    configuration: BTreeMap<String, serde_json::Value>,
    risk_level: u8,
    expected_impact: f64,
}

impl Condition {
    /// Create a low-risk condition with an empty configuration.
    #[must_use]
    pub fn new(condition_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::builder(condition_id, name).build()
    }

    /// Create a builder for constructing a condition with optional fields.
    #[must_use]
    pub fn builder(condition_id: impl Into<String>, name: impl Into<String>) -> ConditionBuilder {
        ConditionBuilder::new(condition_id, name)
    }

    /// Get the condition ID.
    #[must_use]
    pub fn condition_id(&self) -> &str {
        &self.condition_id
    }

    /// Get the condition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the opaque configuration.
    #[must_use]
    pub const fn configuration(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.configuration
    }

    /// Risk level, 1 (safe) to 5 (dangerous).
    #[must_use]
    pub const fn risk_level(&self) -> u8 {
        self.risk_level
    }

    /// Expected impact in percent.
    #[must_use]
    pub const fn expected_impact(&self) -> f64 {
        self.expected_impact
    }
}

/// Builder for `Condition`.
#[derive(Debug)]
pub struct ConditionBuilder {
    condition: Condition,
}

impl ConditionBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(condition_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            condition: Condition {
                condition_id: condition_id.into(),
                name: name.into(),
                description: String::new(),
                configuration: BTreeMap::new(),
                risk_level: MIN_RISK_LEVEL,
                expected_impact: 0.0,
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.condition.description = description.into();
        self
    }

    /// Add one configuration entry.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.condition.configuration.insert(key.into(), value);
        self
    }

    /// Set the risk level (validated when the design is built).
    #[must_use]
    pub const fn risk_level(mut self, risk_level: u8) -> Self {
        self.condition.risk_level = risk_level;
        self
    }

    /// Set the expected impact in percent.
    #[must_use]
    pub const fn expected_impact(mut self, percent: f64) -> Self {
        self.condition.expected_impact = percent;
        self
    }

    /// Build the `Condition`.
    #[must_use]
    pub fn build(self) -> Condition {
        self.condition
    }
}
