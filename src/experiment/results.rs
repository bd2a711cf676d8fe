//! Experiment Results - the finalized, immutable verdict of an experiment

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::running::GroupedSamples;
use crate::analysis::{SampleStats, Significance};

/// Improvement (percent) at or below which a significant effect is harmful
pub const HARMFUL_IMPROVEMENT_PERCENT: f64 = -5.0;

/// Business classification of a finished experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Significant improvement
    Success,
    /// Could not be analyzed (aborted, or no usable data)
    Failure,
    /// No significant difference
    Inconclusive,
    /// Significant regression beyond the harm threshold
    Harmful,
    /// Significant but negligible regression
    Neutral,
}

impl Outcome {
    /// Derive the outcome from significance and improvement.
    ///
    /// # Example
    /// ```
    /// use optimization_lab::analysis::Significance;
    /// use optimization_lab::experiment::Outcome;
    ///
    /// assert_eq!(Outcome::classify(Significance::NotSignificant, 40.0), Outcome::Inconclusive);
    /// assert_eq!(Outcome::classify(Significance::Significant, 2.0), Outcome::Success);
    /// assert_eq!(Outcome::classify(Significance::Significant, -2.0), Outcome::Neutral);
    /// assert_eq!(Outcome::classify(Significance::Significant, -5.0), Outcome::Harmful);
    /// ```
    #[must_use]
    pub fn classify(significance: Significance, improvement: f64) -> Self {
        if !significance.is_significant() {
            Self::Inconclusive
        } else if improvement > 0.0 {
            Self::Success
        } else if improvement > HARMFUL_IMPROVEMENT_PERCENT {
            Self::Neutral
        } else {
            Self::Harmful
        }
    }

    /// Durable string tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Inconclusive => "INCONCLUSIVE",
            Self::Harmful => "HARMFUL",
            Self::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalized results, created exactly once when an experiment stops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentResults {
    /// Experiment the results belong to
    pub experiment_id: String,
    /// Why the experiment stopped (`maximum_runtime_reached`, ...)
    pub stop_reason: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was stopped
    pub completed_at: DateTime<Utc>,
    /// Measurements logged over the run
    pub total_samples: usize,
    /// Samples per condition at stop time
    pub sample_counts: BTreeMap<String, usize>,
    /// Raw values per condition and metric
    pub grouped_samples: GroupedSamples,
    /// Primary-metric statistics per condition
    pub condition_summaries: BTreeMap<String, SampleStats>,
    /// Business classification
    pub outcome: Outcome,
    /// Significance tier
    pub significance: Significance,
    /// Condition with the better primary-metric mean, if analyzed
    pub best_condition: Option<String>,
    /// Relative improvement of the primary metric, in percent
    pub improvement_percentage: f64,
    /// Interval around the improvement, in percent
    pub confidence_interval: (f64, f64),
    /// Approximate p-value
    pub p_value: f64,
    /// Recommended action
    pub recommendation: String,
    /// Observations about how the run went
    pub lessons_learned: Vec<String>,
    /// Suggested follow-up experiments
    pub next_experiments: Vec<String>,
    /// Whether interim data stopped the run
    pub early_stop_triggered: bool,
    /// Whether a harmful regression demanded a rollback
    pub rollback_triggered: bool,
}

impl ExperimentResults {
    /// Runtime between start and stop.
    #[must_use]
    pub fn runtime(&self) -> std::time::Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Compact summary for listings and status queries.
    #[must_use]
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            experiment_id: self.experiment_id.clone(),
            outcome: self.outcome,
            significance: self.significance,
            best_condition: self.best_condition.clone(),
            improvement_percentage: self.improvement_percentage,
            p_value: self.p_value,
            stop_reason: self.stop_reason.clone(),
            total_samples: self.total_samples,
            completed_at: self.completed_at,
            recommendation: self.recommendation.clone(),
        }
    }
}

/// Compact view of stored results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSummary {
    /// Experiment the results belong to
    pub experiment_id: String,
    /// Business classification
    pub outcome: Outcome,
    /// Significance tier
    pub significance: Significance,
    /// Winning condition, if analyzed
    pub best_condition: Option<String>,
    /// Relative improvement, in percent
    pub improvement_percentage: f64,
    /// Approximate p-value
    pub p_value: f64,
    /// Why the experiment stopped
    pub stop_reason: String,
    /// Measurements logged over the run
    pub total_samples: usize,
    /// When the run was stopped
    pub completed_at: DateTime<Utc>,
    /// Recommended action
    pub recommendation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_tags() {
        assert_eq!(serde_json::to_string(&Outcome::Harmful).unwrap(), "\"HARMFUL\"");
        let parsed: Outcome = serde_json::from_str("\"INCONCLUSIVE\"").unwrap();
        assert_eq!(parsed, Outcome::Inconclusive);
    }

    #[test]
    fn test_classify_not_significant_is_inconclusive() {
        assert_eq!(
            Outcome::classify(Significance::NotSignificant, -80.0),
            Outcome::Inconclusive
        );
    }

    #[test]
    fn test_classify_harm_boundary() {
        let s = Significance::HighlySignificant;
        assert_eq!(Outcome::classify(s, -4.99), Outcome::Neutral);
        assert_eq!(Outcome::classify(s, -5.0), Outcome::Harmful);
        assert_eq!(Outcome::classify(s, 0.0), Outcome::Neutral);
    }
}
