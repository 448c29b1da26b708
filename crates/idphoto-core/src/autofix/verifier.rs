//! Quality verification between correction steps.

use std::collections::HashSet;

use super::ProbeResult;
use crate::domain::{
    ComplianceReport, ImprovementAssessment, ImprovementMetrics, QualityAxis, QualityMetrics,
};

/// Whether `after` keeps quality and compliance within `tolerance` points of `before`.
#[must_use]
pub fn verify_quality_preserved(before: &ProbeResult, after: &ProbeResult, tolerance: f64) -> bool {
    let quality_drop = before.quality.overall_score - after.quality.overall_score;
    let compliance_drop = before.report.overall_score - after.report.overall_score;
    quality_drop <= tolerance && compliance_drop <= tolerance
}

/// Per-axis comparison of two quality assessments.
#[must_use]
pub fn assess_improvement(
    before: &QualityMetrics,
    after: &QualityMetrics,
    tolerance: f64,
) -> ImprovementAssessment {
    let axis_deltas: Vec<(QualityAxis, f64)> = QualityAxis::ALL
        .iter()
        .map(|&axis| (axis, after.score(axis) - before.score(axis)))
        .collect();
    let degradation_areas: Vec<QualityAxis> = axis_deltas
        .iter()
        .filter(|(_, delta)| *delta < -tolerance)
        .map(|(axis, _)| *axis)
        .collect();
    let recommendations = degradation_areas
        .iter()
        .map(|axis| match axis {
            QualityAxis::Sharpness => "Correction softened the image; review edges manually",
            QualityAxis::Lighting => "Correction hurt exposure; consider retaking with even light",
            QualityAxis::Color => "Correction introduced a colour cast; check white balance",
            QualityAxis::Noise => "Correction amplified noise; use a cleaner original",
            QualityAxis::Resolution => "Correction reduced usable resolution",
        })
        .map(str::to_string)
        .collect();

    ImprovementAssessment {
        axis_deltas,
        overall_delta: after.overall_score - before.overall_score,
        degradation_areas,
        recommendations,
    }
}

/// Before/after comparison of two compliance reports.
///
/// The compliance improvement is reported as measured, including negative
/// values.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_improvement_metrics(
    before: &ComplianceReport,
    after: &ComplianceReport,
    applied: usize,
    planned: usize,
) -> ImprovementMetrics {
    let failing = |report: &ComplianceReport| -> HashSet<String> {
        report
            .issue_summary
            .iter()
            .map(|i| i.rule_id.clone())
            .collect()
    };
    let before_failing = failing(before);
    let after_failing = failing(after);

    let success_rate = if planned == 0 {
        0.0
    } else {
        applied as f64 / planned as f64
    };
    let mean_confidence = if after.rule_results.is_empty() {
        0.0
    } else {
        after
            .rule_results
            .iter()
            .map(|r| f64::from(r.confidence))
            .sum::<f64>()
            / after.rule_results.len() as f64
    };
    let improvement = after.overall_score - before.overall_score;
    let confidence_score = if improvement < 0.0 {
        mean_confidence * 0.5
    } else {
        mean_confidence
    };

    ImprovementMetrics {
        overall_compliance_improvement: improvement,
        resolved_issues: before_failing.difference(&after_failing).count(),
        new_issues: after_failing.difference(&before_failing).count(),
        success_rate,
        confidence_score: confidence_score.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueCategory, QualityDetails, RuleCategory, RuleResult, Severity};

    fn quality(overall: f64, sharpness: f64) -> QualityMetrics {
        QualityMetrics {
            sharpness_score: sharpness,
            lighting_score: 90.0,
            color_score: 90.0,
            noise_score: 90.0,
            resolution_score: 100.0,
            overall_score: overall,
            issues: vec![],
            suggestions: vec![],
            details: QualityDetails::default(),
        }
    }

    fn rule(id: &str, passes: bool) -> RuleResult {
        RuleResult {
            rule_id: id.to_string(),
            rule_name: id.to_string(),
            category: RuleCategory::StyleLighting,
            issue_category: IssueCategory::Background,
            passes,
            measured_value: 0.0,
            required_value: 0.0,
            confidence: 0.8,
            severity: Severity::Major,
            regulation_reference: String::new(),
            suggestion: String::new(),
            auto_fixable: true,
        }
    }

    fn report(score: f64, results: Vec<RuleResult>) -> ComplianceReport {
        ComplianceReport::from_results("ICAO", results, vec![], score, 75.0)
    }

    fn probe(compliance: f64, quality_score: f64) -> ProbeResult {
        ProbeResult {
            report: report(compliance, vec![]),
            quality: quality(quality_score, 90.0),
            mask: None,
        }
    }

    #[test]
    fn test_verify_uses_tolerance_on_both_scores() {
        let before = probe(70.0, 80.0);
        assert!(verify_quality_preserved(&before, &probe(85.0, 79.0), 2.0));
        assert!(!verify_quality_preserved(&before, &probe(65.0, 80.0), 2.0));
        assert!(!verify_quality_preserved(&before, &probe(90.0, 70.0), 2.0));
    }

    #[test]
    fn test_negative_improvement_is_not_clamped() {
        let before = report(80.0, vec![rule("A", false), rule("B", true)]);
        let after = report(70.0, vec![rule("A", true), rule("B", false)]);
        let metrics = calculate_improvement_metrics(&before, &after, 1, 2);
        assert!((metrics.overall_compliance_improvement + 10.0).abs() < 1e-9);
        assert_eq!(metrics.resolved_issues, 1);
        assert_eq!(metrics.new_issues, 1);
        assert!((metrics.success_rate - 0.5).abs() < 1e-9);
        assert!((metrics.confidence_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_assessment_lists_degraded_axes() {
        let assessment = assess_improvement(&quality(80.0, 90.0), &quality(78.0, 70.0), 2.0);
        assert_eq!(assessment.degradation_areas, vec![QualityAxis::Sharpness]);
        assert_eq!(assessment.recommendations.len(), 1);
        assert!((assessment.overall_delta + 2.0).abs() < 1e-9);
    }
}
