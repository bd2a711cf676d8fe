//! Descriptive statistics over a single sample set

use serde::{Deserialize, Serialize};

/// Mean, sample standard deviation and size of one sample set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Arithmetic mean (0 for an empty set)
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator; 0 below two values)
    pub std_dev: f64,
    /// Number of observations
    pub count: usize,
}

impl SampleStats {
    /// Describe a sample set.
    ///
    /// # Example
    /// ```
    /// use optimization_lab::analysis::SampleStats;
    ///
    /// let stats = SampleStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
    /// assert!((stats.mean - 5.0).abs() < 1e-12);
    /// assert_eq!(stats.count, 8);
    /// ```
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std_dev: sample_std_dev(values),
            count: values.len(),
        }
    }

    /// Sample variance
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }
}

/// Arithmetic mean, 0 for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation, 0 when fewer than two values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Cohen's d of `treatment` relative to `control` using the pooled standard deviation.
///
/// Returns 0 when the pooled deviation is 0 or undefined (fewer than 3 values overall).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn effect_size(control: &SampleStats, treatment: &SampleStats) -> f64 {
    let dof = (control.count + treatment.count).saturating_sub(2);
    if dof == 0 {
        return 0.0;
    }
    let pooled_var = (control.count.saturating_sub(1) as f64).mul_add(
        control.variance(),
        treatment.count.saturating_sub(1) as f64 * treatment.variance(),
    ) / dof as f64;
    let pooled_sd = pooled_var.sqrt();
    if pooled_sd == 0.0 {
        return 0.0;
    }
    (treatment.mean - control.mean) / pooled_sd
}
