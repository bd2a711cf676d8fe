//! Statistical Analyzer
//!
//! Pure functions comparing sample sets collected for experiment conditions:
//! descriptive statistics, effect size, an approximate p-value, a significance
//! tier and a recommendation. No state and no I/O, so every function is safe
//! to call concurrently.
//!
//! ## Usage
//!
//! ```rust
//! use optimization_lab::analysis::{analyze_two_sample, Significance};
//!
//! let control = [10.0, 10.0, 10.0, 10.0];
//! let treatment = [5.0, 5.0, 5.0, 5.0];
//!
//! let result = analyze_two_sample(&control, &treatment)?;
//! assert!((result.improvement + 50.0).abs() < 1e-9);
//! assert_eq!(result.significance, Significance::HighlySignificant);
//! # Ok::<(), optimization_lab::Error>(())
//! ```

mod descriptive;
mod recommendation;
mod significance;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use descriptive::{effect_size, mean, sample_std_dev, SampleStats};
pub use recommendation::recommendation;
pub use significance::{approximate_test, standard_error, Significance, TestStatistic};

/// Group label of the control set in two-sample results
pub const CONTROL_GROUP: &str = "control";

/// Group label of the treatment set in two-sample results
pub const TREATMENT_GROUP: &str = "treatment";

/// z multiplier for the 95% confidence interval
const CI_Z: f64 = 1.96;

/// Which procedure produced an [`AnalysisResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    /// Control vs. treatment
    TwoSample,
    /// Best vs. worst of several groups
    Multivariate,
}

/// Full output of an analysis, including intermediate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Procedure used
    pub method: AnalysisMethod,
    /// Per-group descriptive statistics
    pub groups: BTreeMap<String, SampleStats>,
    /// Group with the better mean
    pub best_group: String,
    /// Group the improvement is measured against
    pub baseline_group: String,
    /// Relative change of the best (or treatment) mean over the baseline, in percent
    pub improvement: f64,
    /// Cohen's d between the compared groups
    pub effect_size: f64,
    /// Standard error of the difference in means
    pub standard_error: f64,
    /// t-statistic, absent when the p-value was forced by degenerate input
    pub t_statistic: Option<f64>,
    /// Approximate p-value
    pub p_value: f64,
    /// Significance tier of `p_value`
    pub significance: Significance,
    /// Interval around `improvement`, in percent
    pub confidence_interval: (f64, f64),
    /// Generated recommendation text
    pub recommendation: String,
}

/// Compare a treatment sample set against a control sample set.
///
/// # Errors
///
/// Returns [`Error::Validation`] if either set is empty.
#[allow(clippy::float_cmp)]
pub fn analyze_two_sample(control: &[f64], treatment: &[f64]) -> Result<AnalysisResult> {
    if control.is_empty() || treatment.is_empty() {
        return Err(Error::Validation(format!(
            "two-sample analysis needs non-empty sets (control: {}, treatment: {})",
            control.len(),
            treatment.len()
        )));
    }

    let control_stats = SampleStats::from_values(control);
    let treatment_stats = SampleStats::from_values(treatment);
    let improvement = relative_change(control_stats.mean, treatment_stats.mean);
    let best_group = if improvement > 0.0 {
        TREATMENT_GROUP
    } else {
        CONTROL_GROUP
    };

    let groups = BTreeMap::from([
        (CONTROL_GROUP.to_string(), control_stats),
        (TREATMENT_GROUP.to_string(), treatment_stats),
    ]);

    Ok(compare(
        AnalysisMethod::TwoSample,
        groups,
        CONTROL_GROUP,
        best_group,
        improvement,
    ))
}

/// Compare several condition groups: best mean against worst mean.
///
/// Empty groups are ignored. Ties resolve to the first group in key order.
///
/// # Errors
///
/// Returns [`Error::Validation`] if fewer than two non-empty groups remain.
pub fn analyze_multivariate(groups: &BTreeMap<String, Vec<f64>>) -> Result<AnalysisResult> {
    let described: BTreeMap<String, SampleStats> = groups
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(id, values)| (id.clone(), SampleStats::from_values(values)))
        .collect();

    if described.len() < 2 {
        return Err(Error::Validation(format!(
            "multivariate analysis needs at least 2 non-empty groups, got {}",
            described.len()
        )));
    }

    let mut best: Option<(&String, &SampleStats)> = None;
    let mut baseline: Option<(&String, &SampleStats)> = None;
    for (id, stats) in &described {
        if best.map_or(true, |(_, b)| stats.mean > b.mean) {
            best = Some((id, stats));
        }
        if baseline.map_or(true, |(_, b)| stats.mean < b.mean) {
            baseline = Some((id, stats));
        }
    }
    let (Some((best_id, best_stats)), Some((baseline_id, baseline_stats))) = (best, baseline)
    else {
        return Err(Error::Validation("no groups to compare".to_string()));
    };

    let improvement = relative_change(baseline_stats.mean, best_stats.mean);
    let best_id = best_id.clone();
    let baseline_id = baseline_id.clone();

    Ok(compare(
        AnalysisMethod::Multivariate,
        described,
        &baseline_id,
        &best_id,
        improvement,
    ))
}

/// Relative change of `value` over `reference`, in percent (0 for a zero reference).
#[must_use]
#[allow(clippy::float_cmp)]
pub fn relative_change(reference: f64, value: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (value - reference) / reference * 100.0
}

#[allow(clippy::float_cmp)]
fn compare(
    method: AnalysisMethod,
    groups: BTreeMap<String, SampleStats>,
    baseline_group: &str,
    best_group: &str,
    improvement: f64,
) -> AnalysisResult {
    let baseline = groups[baseline_group];
    let compared = if method == AnalysisMethod::TwoSample {
        groups[TREATMENT_GROUP]
    } else {
        groups[best_group]
    };

    let test = approximate_test(&baseline, &compared);
    let significance = Significance::from_p_value(test.p_value);

    let confidence_interval = if baseline.mean == 0.0 {
        (0.0, 0.0)
    } else {
        let margin = CI_Z * test.standard_error / baseline.mean * 100.0;
        (improvement - margin, improvement + margin)
    };

    AnalysisResult {
        method,
        best_group: best_group.to_string(),
        baseline_group: baseline_group.to_string(),
        improvement,
        effect_size: effect_size(&baseline, &compared),
        standard_error: test.standard_error,
        t_statistic: test.t_statistic,
        p_value: test.p_value,
        significance,
        confidence_interval,
        recommendation: recommendation(improvement, significance),
        groups,
    }
}
