//! Aggregation of rule categories into a compliance report.

use tracing::debug;

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::RuleSpec;
use super::{expression, geometry, glasses, head_covering, photo_quality, style};
use crate::domain::{
    CategoryScore, ComplianceReport, IssueCategory, RuleCategory, RuleResult, Severity,
};

/// Synthetic rule raised when no face was found.
pub const FACE_DETECTION_RULE: &str = "FACE_DETECTION";

const FACE_DETECTION: RuleSpec = RuleSpec {
    id: FACE_DETECTION_RULE,
    name: "face_detected",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::FaceDetection,
    severity: Severity::Critical,
    auto_fixable: false,
};

impl RuleCategory {
    /// Evaluates every rule of this category.
    #[must_use]
    pub fn evaluate(
        self,
        evidence: &ValidationEvidence<'_>,
        params: &RuleParameters,
    ) -> Vec<RuleResult> {
        match self {
            Self::Glasses => glasses::evaluate(evidence, params),
            Self::HeadCovering => head_covering::evaluate(evidence, params),
            Self::Expression => expression::evaluate(evidence, params),
            Self::Quality => photo_quality::evaluate(evidence, params),
            Self::StyleLighting => style::evaluate(evidence, params),
            Self::Geometry => geometry::evaluate(evidence, params),
        }
    }
}

/// Stateless rules engine.
///
/// Parameters are passed per call, so one engine can serve concurrent
/// validations against different formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesEngine;

impl RulesEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates all categories and aggregates them into a report.
    ///
    /// Without a face the report holds a single critical `FACE_DETECTION`
    /// violation and scores 0.
    #[must_use]
    pub fn validate_complete_compliance(
        &self,
        evidence: &ValidationEvidence<'_>,
        params: &RuleParameters,
    ) -> ComplianceReport {
        if evidence.face.is_none() {
            debug!("no face, short-circuiting {} validation", params.variation);
            return Self::no_face_report(params);
        }

        let mut results = Vec::new();
        let mut scores = Vec::new();
        for category in RuleCategory::ALL {
            let category_results = category.evaluate(evidence, params);
            if let Some(score) = category_score(category, &category_results) {
                scores.push(score);
            }
            results.extend(category_results);
        }

        let overall = weighted_score(&scores, params);
        debug!(
            "{}: overall {overall:.1} from {} rules in {} categories",
            params.variation,
            results.len(),
            scores.len()
        );
        ComplianceReport::from_results(
            params.variation.name(),
            results,
            scores,
            overall,
            params.pass_threshold,
        )
    }

    /// Report for an image with no detectable face.
    #[must_use]
    pub fn no_face_report(params: &RuleParameters) -> ComplianceReport {
        let missing = FACE_DETECTION.outcome(
            false,
            0.0,
            1.0,
            1.0,
            "No face detected; use a clear frontal photo of a single person",
        );
        ComplianceReport::from_results(
            params.variation.name(),
            vec![missing],
            Vec::new(),
            0.0,
            params.pass_threshold,
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn category_score(category: RuleCategory, results: &[RuleResult]) -> Option<CategoryScore> {
    if results.is_empty() {
        return None;
    }
    let passed = results.iter().filter(|r| r.passes).count();
    Some(CategoryScore {
        category,
        score: 100.0 * passed as f64 / results.len() as f64,
        passed,
        total: results.len(),
    })
}

/// Weighted mean of the category scores. Categories with zero weight are ignored.
fn weighted_score(scores: &[CategoryScore], params: &RuleParameters) -> f64 {
    let (sum, weight) = scores.iter().fold((0.0, 0.0), |(sum, weight), s| {
        let w = params.category_weight(s.category);
        (sum + s.score * w, weight + w)
    });
    if weight <= 0.0 {
        0.0
    } else {
        sum / weight
    }
}
