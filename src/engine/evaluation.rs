//! Turning a frozen run into analysis input and results

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::insights;
use crate::analysis::{
    analyze_multivariate, analyze_two_sample, relative_change, AnalysisResult, SampleStats,
    Significance, TREATMENT_GROUP,
};
use crate::experiment::{ExperimentKind, ExperimentResults, Outcome, RunningExperiment};
use crate::{Error, Result};

/// Primary-metric samples of the control and treatment arms, in design order.
///
/// Only conditions that have data are considered; `None` unless exactly two do.
fn two_arms(
    run: &RunningExperiment,
    groups: &BTreeMap<String, Vec<f64>>,
) -> Option<((String, Vec<f64>), (String, Vec<f64>))> {
    let mut arms = run
        .design()
        .conditions()
        .iter()
        .filter_map(|c| {
            groups
                .get(c.condition_id())
                .filter(|values| !values.is_empty())
                .map(|values| (c.condition_id().to_string(), values.clone()))
        });
    let control = arms.next()?;
    let treatment = arms.next()?;
    if arms.next().is_some() {
        return None;
    }
    Some((control, treatment))
}

/// Whether the design is analyzed as a control/treatment pair.
fn is_two_sample(run: &RunningExperiment) -> bool {
    let design = run.design();
    design.kind() == ExperimentKind::AbTest && design.conditions().len() == 2
}

/// Check that `analyze` can succeed on the run's current data.
///
/// # Errors
///
/// Returns [`Error::Validation`] describing the missing data.
pub fn ensure_analyzable(run: &RunningExperiment) -> Result<()> {
    let groups = run.primary_metric_samples();
    let populated = groups.values().filter(|v| !v.is_empty()).count();
    let needed = 2;
    if populated < needed {
        return Err(Error::Validation(format!(
            "experiment {} has primary-metric ('{}') data for {populated} condition(s), {needed} needed for analysis",
            run.experiment_id(),
            run.design().primary_metric()
        )));
    }
    Ok(())
}

/// Analysis of the run's primary metric plus the condition that won it.
///
/// # Errors
///
/// Returns [`Error::Validation`] if there is not enough data.
pub fn analyze(run: &RunningExperiment) -> Result<(AnalysisResult, Option<String>)> {
    let groups = run.primary_metric_samples();

    if is_two_sample(run) {
        let ((control_id, control), (treatment_id, treatment)) = two_arms(run, &groups)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "A/B experiment {} needs primary-metric data for both conditions",
                    run.experiment_id()
                ))
            })?;
        let analysis = analyze_two_sample(&control, &treatment)?;
        let best = if analysis.best_group == TREATMENT_GROUP {
            treatment_id
        } else {
            control_id
        };
        return Ok((analysis, Some(best)));
    }

    let analysis = analyze_multivariate(&groups)?;
    let best = analysis.best_group.clone();
    Ok((analysis, Some(best)))
}

/// Whether interim primary-metric data show a regression beyond the rollback threshold.
///
/// Activates once total samples reach `max(min_samples_floor, sample_size_per_condition / 4)`
/// and exactly two conditions have primary-metric data. Only the running
/// per-condition means are read, so the check is cheap enough to run under
/// the entry lock on every measurement.
#[must_use]
pub fn detects_harmful_regression(run: &RunningExperiment, min_samples_floor: usize) -> bool {
    let design = run.design();
    let activation = min_samples_floor.max(design.sample_size_per_condition() / 4);
    if run.total_samples() < activation {
        return false;
    }

    let mut means = design
        .conditions()
        .iter()
        .filter_map(|c| run.primary_mean(c.condition_id()));
    let (Some(control), Some(treatment), None) = (means.next(), means.next(), means.next()) else {
        return false;
    };
    relative_change(control, treatment) < -design.rollback_threshold() * 100.0
}

fn condition_summaries(run: &RunningExperiment) -> BTreeMap<String, SampleStats> {
    run.primary_metric_samples()
        .iter()
        .map(|(id, values)| (id.clone(), SampleStats::from_values(values)))
        .collect()
}

/// Results of an analyzed run.
///
/// A run whose rollback was triggered is always classified `Harmful`.
#[must_use]
pub fn analyzed_results(
    run: &RunningExperiment,
    reason: &str,
    analysis: &AnalysisResult,
    best_condition: Option<String>,
    completed_at: DateTime<Utc>,
) -> ExperimentResults {
    let outcome = if run.rollback_triggered() {
        Outcome::Harmful
    } else {
        Outcome::classify(analysis.significance, analysis.improvement)
    };

    ExperimentResults {
        experiment_id: run.experiment_id().to_string(),
        stop_reason: reason.to_string(),
        started_at: run.started_at(),
        completed_at,
        total_samples: run.total_samples(),
        sample_counts: run.sample_counts().clone(),
        grouped_samples: run.grouped_samples(),
        condition_summaries: condition_summaries(run),
        outcome,
        significance: analysis.significance,
        best_condition: best_condition.clone(),
        improvement_percentage: analysis.improvement,
        confidence_interval: analysis.confidence_interval,
        p_value: analysis.p_value,
        recommendation: analysis.recommendation.clone(),
        lessons_learned: insights::lessons_learned(
            run,
            reason,
            analysis.significance,
            analysis.p_value,
            completed_at,
        ),
        next_experiments: insights::next_experiments(
            run.design(),
            outcome,
            analysis.improvement,
            best_condition.as_deref(),
        ),
        early_stop_triggered: run.early_stop_triggered(),
        rollback_triggered: run.rollback_triggered(),
    }
}

/// Results of a run terminated without analysis.
#[must_use]
pub fn failed_results(
    run: &RunningExperiment,
    reason: &str,
    completed_at: DateTime<Utc>,
) -> ExperimentResults {
    let significance = Significance::NotSignificant;
    let outcome = Outcome::Failure;
    ExperimentResults {
        experiment_id: run.experiment_id().to_string(),
        stop_reason: reason.to_string(),
        started_at: run.started_at(),
        completed_at,
        total_samples: run.total_samples(),
        sample_counts: run.sample_counts().clone(),
        grouped_samples: run.grouped_samples(),
        condition_summaries: condition_summaries(run),
        outcome,
        significance,
        best_condition: None,
        improvement_percentage: 0.0,
        confidence_interval: (0.0, 0.0),
        p_value: 1.0,
        recommendation: format!(
            "Experiment terminated without analysis ({reason}): keep the current configuration"
        ),
        lessons_learned: insights::lessons_learned(run, reason, significance, 1.0, completed_at),
        next_experiments: insights::next_experiments(run.design(), outcome, 0.0, None),
        early_stop_triggered: run.early_stop_triggered(),
        rollback_triggered: run.rollback_triggered(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::experiment::{Condition, ExperimentDesign, Metric};

    fn run(kind: ExperimentKind, conditions: &[&str], sample_size: usize) -> RunningExperiment {
        let mut builder = ExperimentDesign::builder("eval", kind)
            .metric(Metric::new("latency", "ms"))
            .metric(Metric::new("errors", "count"))
            .primary_metric("latency")
            .sample_size_per_condition(sample_size);
        for id in conditions {
            builder = builder.condition(Condition::new(*id, *id));
        }
        RunningExperiment::start(Arc::new(builder.build().unwrap()))
    }

    fn record(run: &mut RunningExperiment, condition: &str, metric: &str, values: &[f64]) {
        for v in values {
            run.record(condition, metric, *v, BTreeMap::new()).unwrap();
        }
    }

    #[test]
    fn test_ensure_analyzable_needs_two_arms() {
        let mut r = run(ExperimentKind::AbTest, &["control", "treatment"], 100);
        record(&mut r, "control", "latency", &[1.0, 2.0]);
        record(&mut r, "treatment", "errors", &[1.0]);
        assert!(ensure_analyzable(&r).unwrap_err().is_validation());

        record(&mut r, "treatment", "latency", &[1.0]);
        assert!(ensure_analyzable(&r).is_ok());
    }

    #[test]
    fn test_ab_uses_declaration_order() {
        // "treatment" sorts after "baseline" alphabetically, but is declared first here
        let mut r = run(ExperimentKind::AbTest, &["treatment", "baseline"], 100);
        record(&mut r, "treatment", "latency", &[10.0, 10.0]);
        record(&mut r, "baseline", "latency", &[20.0, 20.0]);

        let (analysis, best) = analyze(&r).unwrap();
        assert!((analysis.improvement - 100.0).abs() < 1e-9);
        assert_eq!(best.as_deref(), Some("baseline"));
    }

    #[test]
    fn test_non_ab_kind_is_multivariate() {
        let mut r = run(ExperimentKind::Canary, &["stable", "canary"], 100);
        record(&mut r, "stable", "latency", &[10.0, 11.0]);
        record(&mut r, "canary", "latency", &[30.0, 31.0]);

        let (analysis, best) = analyze(&r).unwrap();
        assert_eq!(analysis.method, crate::analysis::AnalysisMethod::Multivariate);
        assert_eq!(best.as_deref(), Some("canary"));
    }

    #[test]
    fn test_early_stop_waits_for_activation() {
        let mut r = run(ExperimentKind::AbTest, &["control", "treatment"], 40);
        record(&mut r, "control", "latency", &[100.0; 14]);
        record(&mut r, "treatment", "latency", &[80.0; 15]);
        assert!(!detects_harmful_regression(&r, 30));

        record(&mut r, "control", "latency", &[100.0]);
        assert!(detects_harmful_regression(&r, 30));
    }

    #[test]
    fn test_early_stop_ignores_small_regression() {
        let mut r = run(ExperimentKind::AbTest, &["control", "treatment"], 40);
        record(&mut r, "control", "latency", &[100.0; 15]);
        record(&mut r, "treatment", "latency", &[97.0; 15]);
        assert!(!detects_harmful_regression(&r, 30));
    }

    #[test]
    fn test_early_stop_matches_full_analysis() {
        let mut r = run(ExperimentKind::AbTest, &["control", "treatment"], 40);
        record(&mut r, "control", "latency", &[100.0, 101.5, 99.25, 100.75, 98.0]);
        record(&mut r, "treatment", "latency", &[89.0, 90.5, 91.25, 88.75, 90.0]);
        record(&mut r, "treatment", "errors", &[1.0; 20]);

        let (analysis, _) = analyze(&r).unwrap();
        assert!(analysis.improvement < -r.design().rollback_threshold() * 100.0);
        assert!(detects_harmful_regression(&r, 30));
    }

    #[test]
    fn test_early_stop_needs_exactly_two_arms() {
        let mut r = run(ExperimentKind::Multivariate, &["a", "b", "c"], 40);
        record(&mut r, "a", "latency", &[100.0; 10]);
        record(&mut r, "b", "latency", &[50.0; 10]);
        record(&mut r, "c", "latency", &[50.0; 10]);
        assert!(!detects_harmful_regression(&r, 30));
    }

    #[test]
    fn test_failed_results_shape() {
        let r = run(ExperimentKind::AbTest, &["control", "treatment"], 10);
        let results = failed_results(&r, "aborted", Utc::now());
        assert_eq!(results.outcome, Outcome::Failure);
        assert!(results.best_condition.is_none());
        assert!((results.p_value - 1.0).abs() < f64::EPSILON);
        assert!(!results.next_experiments.is_empty());
    }
}
