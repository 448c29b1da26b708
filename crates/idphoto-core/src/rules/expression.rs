//! Expression, gaze and head pose rules.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{IssueCategory, RuleCategory, RuleResult, Severity};

const NEUTRAL_EXPRESSION: RuleSpec = RuleSpec {
    id: "ICAO.4.1.1",
    name: "neutral_expression",
    category: RuleCategory::Expression,
    issue_category: IssueCategory::Expression,
    severity: Severity::Major,
    auto_fixable: false,
};

const DIRECT_GAZE: RuleSpec = RuleSpec {
    id: "ICAO.4.1.2",
    name: "direct_gaze",
    category: RuleCategory::Expression,
    issue_category: IssueCategory::Expression,
    severity: Severity::Major,
    auto_fixable: false,
};

const EYES_OPEN: RuleSpec = RuleSpec {
    id: "ICAO.4.1.3",
    name: "eyes_open",
    category: RuleCategory::Expression,
    issue_category: IssueCategory::Expression,
    severity: Severity::Critical,
    auto_fixable: false,
};

const MOUTH_CLOSED: RuleSpec = RuleSpec {
    id: "ICAO.4.1.4",
    name: "mouth_closed",
    category: RuleCategory::Expression,
    issue_category: IssueCategory::Expression,
    severity: Severity::Minor,
    auto_fixable: false,
};

const HEAD_STRAIGHT: RuleSpec = RuleSpec {
    id: "ICAO.4.1.5",
    name: "head_straight",
    category: RuleCategory::Expression,
    issue_category: IssueCategory::Geometry,
    severity: Severity::Minor,
    auto_fixable: true,
};

/// Evaluates the five expression rules.
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let Some(face) = evidence.face else {
        return Vec::new();
    };
    let p = &params.expression;
    let f = &face.features;
    let conf = face.detection.confidence;

    let smile = f64::from(f.smile_score);
    let mouth = f64::from(f.mouth_openness);
    let max_smile = f64::from(p.max_smile);
    let max_mouth = f64::from(p.max_mouth_openness);
    let neutral = NEUTRAL_EXPRESSION.outcome(
        f.mouth_openness < p.max_mouth_openness && f.smile_score < p.max_smile,
        smile,
        max_smile,
        conf * margin_confidence(smile, max_smile, 0.2),
        "Keep a neutral expression with the mouth closed and no smile",
    );

    let deviation = f64::from(f.face_orientation.gaze_deviation());
    let max_deviation = f64::from(p.max_gaze_deviation);
    let gaze = DIRECT_GAZE.outcome(
        deviation <= max_deviation,
        deviation,
        max_deviation,
        conf * margin_confidence(deviation, max_deviation, 5.0),
        "Look straight at the camera",
    );

    let (left, right) = f.eye_openness;
    let least_open = f64::from(left.min(right));
    let min_open = f64::from(p.min_eye_openness);
    let eyes = EYES_OPEN.outcome(
        least_open >= min_open,
        least_open,
        min_open,
        conf * margin_confidence(least_open, min_open, 0.2),
        "Both eyes must be open and clearly visible",
    );

    let mouth_closed = MOUTH_CLOSED.outcome(
        mouth <= max_mouth,
        mouth,
        max_mouth,
        conf * margin_confidence(mouth, max_mouth, 0.1),
        "Close the mouth",
    );

    let roll = f64::from(f.face_orientation.roll.abs());
    let max_roll = f64::from(p.max_roll);
    let straight = HEAD_STRAIGHT.outcome(
        roll <= max_roll,
        roll,
        max_roll,
        conf * margin_confidence(roll, max_roll, 3.0),
        "Keep the head level; small tilts can be corrected automatically",
    );

    vec![neutral, gaze, eyes, mouth_closed, straight]
}

/// `100 × passed / 5` over expression results.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn expression_score(results: &[RuleResult]) -> f64 {
    let passed = results
        .iter()
        .filter(|r| r.category == RuleCategory::Expression && r.passes)
        .count();
    100.0 * passed as f64 / 5.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BoundingBox, FaceDetection, FaceFeatures, FaceOrientation, FeatureVisibility, ImageInfo,
        Point, QualityDetails, QualityMetrics,
    };
    use crate::rules::evidence::FaceEvidence;
    use crate::rules::params::CountryVariation;

    fn features() -> FaceFeatures {
        FaceFeatures {
            glasses_detected: false,
            head_covering_detected: false,
            eye_positions: (Point::new(120.0, 150.0), Point::new(180.0, 150.0)),
            mouth_position: Point::new(150.0, 230.0),
            mouth_openness: 0.05,
            smile_score: 0.0,
            eye_openness: (0.9, 0.9),
            face_orientation: FaceOrientation::default(),
            feature_visibility: FeatureVisibility::default(),
        }
    }

    fn run(features: FaceFeatures, params: &RuleParameters) -> Vec<RuleResult> {
        let image = ImageInfo::new("expr.png", image::DynamicImage::new_rgb8(300, 400));
        let quality = QualityMetrics {
            sharpness_score: 100.0,
            lighting_score: 100.0,
            color_score: 100.0,
            noise_score: 100.0,
            resolution_score: 100.0,
            overall_score: 100.0,
            issues: vec![],
            suggestions: vec![],
            details: QualityDetails::default(),
        };
        let face = FaceEvidence {
            detection: FaceDetection {
                bbox: BoundingBox::new(75, 70, 150, 220),
                confidence: 0.9,
            },
            features,
        };
        let evidence = ValidationEvidence::new(&image, &quality).with_face(&face, 1);
        evaluate(&evidence, params)
    }

    #[test]
    fn test_neutral_face_scores_100() {
        let results = run(features(), &RuleParameters::default());
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.passes));
        assert!((expression_score(&results) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gaze_uses_combined_deviation() {
        let mut f = features();
        // sqrt(6² + 8²) = 10, exactly at the ICAO bound
        f.face_orientation = FaceOrientation {
            yaw: 6.0,
            pitch: 8.0,
            roll: 0.0,
        };
        let at_bound = run(f.clone(), &RuleParameters::default());
        assert!(at_bound.iter().all(|r| r.passes));

        f.face_orientation.pitch = 9.0;
        let over = run(f, &RuleParameters::default());
        assert!(over.iter().any(|r| r.rule_id == "ICAO.4.1.2" && !r.passes));
    }

    #[test]
    fn test_smile_and_closed_eye_lower_score() {
        let mut f = features();
        f.smile_score = 0.8;
        f.eye_openness = (0.9, 0.1);
        let results = run(f, &RuleParameters::default());
        assert!((expression_score(&results) - 60.0).abs() < f64::EPSILON);
        let eyes = results.iter().find(|r| r.rule_id == "ICAO.4.1.3");
        assert_eq!(eyes.map(|r| r.severity), Some(Severity::Critical));
    }

    #[test]
    fn test_roll_is_geometry_fixable() {
        let mut f = features();
        f.face_orientation.roll = -3.0;
        let icao = run(f.clone(), &RuleParameters::default());
        assert!(icao.iter().all(|r| r.passes));

        let uae = run(f, &RuleParameters::for_variation(CountryVariation::IcsUae));
        let straight = uae.iter().find(|r| r.rule_id == "ICAO.4.1.5");
        assert_eq!(straight.map(|r| r.passes), Some(false));
        assert_eq!(straight.map(|r| r.auto_fixable), Some(true));
        assert_eq!(straight.map(|r| r.issue_category), Some(IssueCategory::Geometry));
    }
}
