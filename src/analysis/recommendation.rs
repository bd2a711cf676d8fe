//! Recommendation text derived from effect size and significance

use super::Significance;

/// Improvement (percent) above which an effect counts as strong
const STRONG_EFFECT_PERCENT: f64 = 5.0;

/// Human-readable recommendation for an observed improvement.
///
/// # Example
/// ```
/// use optimization_lab::analysis::{recommendation, Significance};
///
/// let text = recommendation(12.0, Significance::Significant);
/// assert!(text.contains("recommend adopting"));
/// ```
#[must_use]
pub fn recommendation(improvement: f64, significance: Significance) -> String {
    if !significance.is_significant() {
        return "No significant difference detected: extend the sample size or runtime before deciding"
            .to_string();
    }
    if improvement > STRONG_EFFECT_PERCENT {
        format!("Strong positive effect ({improvement:+.2}%): recommend adopting the optimization")
    } else if improvement > 0.0 {
        format!("Positive effect ({improvement:+.2}%): consider adopting the optimization")
    } else if improvement > -STRONG_EFFECT_PERCENT {
        format!("Neutral effect ({improvement:+.2}%): no action required")
    } else {
        format!("Negative effect ({improvement:+.2}%): recommend rolling back the optimization")
    }
}
