//! Aggregation of repeated quality measurements.

use crate::domain::{OverallQualityScore, QualityAxis, QualityGrade, QualityMetrics};

/// Averages repeated measurements into a graded score.
///
/// Confidence is `1 - stdev/mean` of the overall scores, clamped to
/// 0.0..=1.0. An empty list scores 0 with grade poor and zero confidence.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn generate_quality_score(metrics: &[QualityMetrics], minimum_overall: f64) -> OverallQualityScore {
    if metrics.is_empty() {
        return OverallQualityScore {
            score: 0.0,
            grade: QualityGrade::Poor,
            passes_threshold: false,
            confidence: 0.0,
            breakdown: QualityAxis::ALL.iter().map(|a| (*a, 0.0)).collect(),
        };
    }

    let n = metrics.len() as f64;
    let mean = metrics.iter().map(|m| m.overall_score).sum::<f64>() / n;
    let variance = metrics
        .iter()
        .map(|m| (m.overall_score - mean).powi(2))
        .sum::<f64>()
        / n;
    let confidence = if mean > 0.0 {
        (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let breakdown = QualityAxis::ALL
        .iter()
        .map(|axis| (*axis, metrics.iter().map(|m| m.score(*axis)).sum::<f64>() / n))
        .collect();

    OverallQualityScore {
        score: mean,
        grade: QualityGrade::from_score(mean),
        passes_threshold: mean >= minimum_overall,
        confidence,
        breakdown,
    }
}
