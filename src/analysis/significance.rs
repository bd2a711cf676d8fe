//! Approximate two-sample hypothesis test
//!
//! The t-statistic is mapped onto a p-value through a fixed threshold table
//! instead of the Student's t distribution. Downstream outcome classification
//! depends on these exact buckets, so they must not be replaced by an exact
//! distribution.

use serde::{Deserialize, Serialize};

use super::SampleStats;

/// Significance tier of an observed difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Significance {
    /// p > 0.05
    NotSignificant,
    /// p <= 0.05
    MarginallySignificant,
    /// p <= 0.01
    Significant,
    /// p <= 0.001
    HighlySignificant,
}

/// Ordered `(p-value ceiling, tier)` table; the first ceiling >= p wins.
const SIGNIFICANCE_TABLE: [(f64, Significance); 4] = [
    (0.001, Significance::HighlySignificant),
    (0.01, Significance::Significant),
    (0.05, Significance::MarginallySignificant),
    (1.0, Significance::NotSignificant),
];

/// `(t-statistic floor, p-value)` buckets, checked in order with a strict `>`.
const T_TO_P: [(f64, f64); 3] = [(3.0, 0.001), (2.6, 0.01), (1.96, 0.05)];

/// p-value for t-statistics below every bucket
const P_VALUE_FLOOR: f64 = 0.1;

impl Significance {
    /// Classify a p-value into its tier.
    ///
    /// # Example
    /// ```
    /// use optimization_lab::analysis::Significance;
    ///
    /// assert_eq!(Significance::from_p_value(0.0), Significance::HighlySignificant);
    /// assert_eq!(Significance::from_p_value(0.05), Significance::MarginallySignificant);
    /// assert_eq!(Significance::from_p_value(0.1), Significance::NotSignificant);
    /// ```
    #[must_use]
    pub fn from_p_value(p_value: f64) -> Self {
        SIGNIFICANCE_TABLE
            .iter()
            .find(|(ceiling, _)| *ceiling >= p_value)
            .map_or(Self::NotSignificant, |(_, tier)| *tier)
    }

    /// Whether the tier is anything above `NotSignificant`
    #[must_use]
    pub const fn is_significant(self) -> bool {
        !matches!(self, Self::NotSignificant)
    }

    /// Durable string tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSignificant => "NOT_SIGNIFICANT",
            Self::MarginallySignificant => "MARGINALLY_SIGNIFICANT",
            Self::Significant => "SIGNIFICANT",
            Self::HighlySignificant => "HIGHLY_SIGNIFICANT",
        }
    }
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the approximate test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestStatistic {
    /// Combined standard error `sqrt(s1²/n1 + s2²/n2)`
    pub standard_error: f64,
    /// `|mean2 - mean1| / se`, absent when the p-value was forced
    pub t_statistic: Option<f64>,
    /// Approximate p-value
    pub p_value: f64,
}

/// Standard error of the difference in means.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn standard_error(control: &SampleStats, treatment: &SampleStats) -> f64 {
    if control.count == 0 || treatment.count == 0 {
        return 0.0;
    }
    (control.variance() / control.count as f64 + treatment.variance() / treatment.count as f64)
        .sqrt()
}

/// Approximate two-sample test of `treatment` against `control`.
///
/// Degenerate inputs force the p-value: identical means with zero standard
/// error give 1.0, while fewer than two observations in either set or a zero
/// standard error with differing means give 0.0.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn approximate_test(control: &SampleStats, treatment: &SampleStats) -> TestStatistic {
    let se = standard_error(control, treatment);
    let means_equal = control.mean == treatment.mean;

    if se == 0.0 && means_equal {
        return TestStatistic {
            standard_error: se,
            t_statistic: None,
            p_value: 1.0,
        };
    }
    if control.count < 2 || treatment.count < 2 || se == 0.0 {
        return TestStatistic {
            standard_error: se,
            t_statistic: None,
            p_value: 0.0,
        };
    }

    let t = (treatment.mean - control.mean).abs() / se;
    let p_value = T_TO_P
        .iter()
        .find(|(floor, _)| t > *floor)
        .map_or(P_VALUE_FLOOR, |(_, p)| *p);

    TestStatistic {
        standard_error: se,
        t_statistic: Some(t),
        p_value,
    }
}
