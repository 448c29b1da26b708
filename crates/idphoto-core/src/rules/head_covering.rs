//! Head covering rules.
//!
//! A covering is accepted as religious-exempt when the face stays visible
//! enough; otherwise it is treated as a non-religious covering.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{IssueCategory, RuleCategory, RuleResult, Severity};

const FACE_VISIBILITY: RuleSpec = RuleSpec {
    id: "ICAO.3.3.1",
    name: "face_visibility",
    category: RuleCategory::HeadCovering,
    issue_category: IssueCategory::HeadCovering,
    severity: Severity::Critical,
    auto_fixable: false,
};

const NON_RELIGIOUS_COVERING: RuleSpec = RuleSpec {
    id: "ICAO.3.3.2",
    name: "non_religious_head_covering",
    category: RuleCategory::HeadCovering,
    issue_category: IssueCategory::HeadCovering,
    severity: Severity::Critical,
    auto_fixable: false,
};

const REQUIRED_FEATURES: RuleSpec = RuleSpec {
    id: "ICAO.3.3.3",
    name: "required_features_visible",
    category: RuleCategory::HeadCovering,
    issue_category: IssueCategory::HeadCovering,
    severity: Severity::Critical,
    auto_fixable: false,
};

/// Evaluates the head covering rules.
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let Some(face) = evidence.face else {
        return Vec::new();
    };
    let p = &params.head_covering;
    let detector_confidence = face.detection.confidence;
    let visibility = face.features.feature_visibility;
    let score = f64::from(visibility.score());
    let threshold = f64::from(p.min_visibility);
    let confidence = detector_confidence * margin_confidence(score, threshold, 0.1);

    let visible = FACE_VISIBILITY.outcome(
        score >= threshold,
        score,
        threshold,
        confidence,
        "The full face must be visible from chin to forehead",
    );

    let covering = if face.features.head_covering_detected {
        NON_RELIGIOUS_COVERING.outcome(
            score >= threshold,
            score,
            threshold,
            confidence,
            "Remove the head covering; religious coverings must leave the face fully visible",
        )
    } else {
        NON_RELIGIOUS_COVERING.outcome(true, score, threshold, detector_confidence, "")
    };

    let missing = visibility.missing(p.feature_min_visibility);
    let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
    #[allow(clippy::cast_precision_loss)]
    let features = REQUIRED_FEATURES.outcome(
        missing.is_empty(),
        missing.len() as f64,
        0.0,
        detector_confidence,
        format!("Required features not visible: {}", names.join(", ")),
    );

    vec![visible, covering, features]
}
