//! Technical quality rules over quality engine scores.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{IssueCategory, QualityAxis, RuleCategory, RuleResult, Severity};

const RULES: [(QualityAxis, RuleSpec, &str); 5] = [
    (
        QualityAxis::Sharpness,
        RuleSpec {
            id: "ICAO.5.1.1",
            name: "sharpness",
            category: RuleCategory::Quality,
            issue_category: IssueCategory::Quality,
            severity: Severity::Major,
            auto_fixable: false,
        },
        "Retake the photo in focus without camera shake",
    ),
    (
        QualityAxis::Lighting,
        RuleSpec {
            id: "ICAO.5.1.2",
            name: "exposure",
            category: RuleCategory::Quality,
            issue_category: IssueCategory::Lighting,
            severity: Severity::Major,
            auto_fixable: true,
        },
        "Adjust exposure so the face is neither too dark nor washed out",
    ),
    (
        QualityAxis::Resolution,
        RuleSpec {
            id: "ICAO.5.1.3",
            name: "resolution",
            category: RuleCategory::Quality,
            issue_category: IssueCategory::Quality,
            severity: Severity::Critical,
            auto_fixable: false,
        },
        "Use a higher resolution original",
    ),
    (
        QualityAxis::Noise,
        RuleSpec {
            id: "ICAO.5.1.4",
            name: "noise",
            category: RuleCategory::Quality,
            issue_category: IssueCategory::Quality,
            severity: Severity::Minor,
            auto_fixable: false,
        },
        "Use more light or a lower ISO setting to reduce noise",
    ),
    (
        QualityAxis::Color,
        RuleSpec {
            id: "ICAO.5.1.5",
            name: "color_balance",
            category: RuleCategory::Quality,
            issue_category: IssueCategory::Quality,
            severity: Severity::Warning,
            auto_fixable: false,
        },
        "Use neutral white balance",
    ),
];

/// Evaluates the quality rules. Needs no face.
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let p = &params.quality;
    RULES
        .iter()
        .map(|(axis, spec, suggestion)| {
            let measured = evidence.quality.score(*axis);
            let required = match axis {
                QualityAxis::Sharpness => p.min_sharpness,
                QualityAxis::Lighting => p.min_lighting,
                QualityAxis::Resolution => p.min_resolution,
                QualityAxis::Noise => p.min_noise,
                QualityAxis::Color => p.min_color,
            };
            spec.outcome(
                measured >= required,
                measured,
                required,
                margin_confidence(measured, required, 20.0),
                *suggestion,
            )
        })
        .collect()
}
