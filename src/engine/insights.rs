//! Lessons learned and follow-up suggestions for finished experiments

use chrono::{DateTime, Utc};

use super::reasons;
use crate::analysis::Significance;
use crate::experiment::{ExperimentDesign, Outcome, RunningExperiment};

/// Observations about how a run went: significance, sample coverage, runtime.
#[must_use]
pub fn lessons_learned(
    run: &RunningExperiment,
    reason: &str,
    significance: Significance,
    p_value: f64,
    completed_at: DateTime<Utc>,
) -> Vec<String> {
    let design = run.design();
    let mut lessons = Vec::new();

    if significance.is_significant() {
        lessons.push(format!(
            "Reached {significance} (p = {p_value:.3}) on primary metric '{}'",
            design.primary_metric()
        ));
    } else {
        lessons.push(format!(
            "Did not reach statistical significance on primary metric '{}'",
            design.primary_metric()
        ));
    }

    let target = design.sample_size_per_condition();
    let short: Vec<String> = run
        .sample_counts()
        .iter()
        .filter(|(_, count)| **count < target)
        .map(|(id, count)| format!("{id} ({count}/{target})"))
        .collect();
    if short.is_empty() {
        lessons.push(format!(
            "All conditions reached the target sample size of {target}"
        ));
    } else {
        lessons.push(format!(
            "Target sample size of {target} not reached for: {}",
            short.join(", ")
        ));
    }

    let elapsed = run.elapsed(completed_at);
    if elapsed < design.minimum_runtime() {
        lessons.push(format!(
            "Stopped after {}s, before the planned minimum runtime of {}s",
            elapsed.as_secs(),
            design.minimum_runtime().as_secs()
        ));
    }

    if run.rollback_triggered() {
        lessons.push(format!(
            "Early stopping detected a regression beyond the {:.1}% rollback threshold after {} samples",
            design.rollback_threshold() * 100.0,
            run.total_samples()
        ));
    } else if reason == reasons::MAXIMUM_RUNTIME_REACHED {
        lessons.push("Runtime budget ran out before the experiment concluded".to_string());
    }

    lessons
}

/// Rule-based follow-up suggestions keyed by outcome.
#[must_use]
pub fn next_experiments(
    design: &ExperimentDesign,
    outcome: Outcome,
    improvement: f64,
    best_condition: Option<&str>,
) -> Vec<String> {
    let primary = design.primary_metric();
    match outcome {
        Outcome::Success => {
            let best = best_condition.unwrap_or("the winning condition");
            vec![
                format!(
                    "Test a more aggressive variant of '{best}' to extend the {improvement:.1}% gain"
                ),
                format!("Validate '{best}' with a canary rollout before full adoption"),
            ]
        }
        Outcome::Inconclusive => vec![
            format!(
                "Re-run with a larger sample, e.g. {} per condition",
                design.sample_size_per_condition() * 2
            ),
            format!(
                "Extend the runtime beyond {}s to collect more '{primary}' data",
                design.maximum_runtime().as_secs()
            ),
        ],
        Outcome::Harmful => vec![
            format!("Investigate the cause of the {:.1}% regression in '{primary}'", improvement.abs()),
            "Re-test a less aggressive configuration once the cause is understood".to_string(),
        ],
        Outcome::Neutral => vec![format!(
            "Try a different optimization: this one had no meaningful effect on '{primary}'"
        )],
        Outcome::Failure => vec![format!(
            "Verify that '{primary}' measurements reach every condition, then re-run"
        )],
    }
}
