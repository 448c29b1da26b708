//! Dimensions and face placement rules.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{IssueCategory, RuleCategory, RuleResult, Severity};

const DIMENSIONS: RuleSpec = RuleSpec {
    id: "ICAO.2.1.1",
    name: "image_dimensions",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::Geometry,
    severity: Severity::Critical,
    auto_fixable: false,
};

const CENTERING: RuleSpec = RuleSpec {
    id: "ICAO.4.2.1",
    name: "face_centering",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::Geometry,
    severity: Severity::Minor,
    auto_fixable: true,
};

const FACE_HEIGHT: RuleSpec = RuleSpec {
    id: "ICAO.4.2.2",
    name: "face_height",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::Geometry,
    severity: Severity::Major,
    auto_fixable: false,
};

const EYE_LINE: RuleSpec = RuleSpec {
    id: "ICAO.4.2.3",
    name: "eye_line_height",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::Geometry,
    severity: Severity::Warning,
    auto_fixable: false,
};

const SINGLE_FACE: RuleSpec = RuleSpec {
    id: "ICAO.4.2.4",
    name: "single_face",
    category: RuleCategory::Geometry,
    issue_category: IssueCategory::FaceDetection,
    severity: Severity::Major,
    auto_fixable: false,
};

/// Checks `value` against an inclusive range, returning the bound it is
/// compared to (the violated one, else the nearer one).
fn in_range(value: f64, (min, max): (f64, f64)) -> (bool, f64) {
    if value < min {
        (false, min)
    } else if value > max {
        (false, max)
    } else if value - min <= max - value {
        (true, min)
    } else {
        (true, max)
    }
}

/// Signed horizontal offset of the face centre from the image centre, as a
/// fraction of image width. Positive means the face sits right of centre.
#[must_use]
pub fn horizontal_offset(evidence: &ValidationEvidence<'_>) -> Option<f64> {
    let face = evidence.face_box()?;
    let width = f64::from(evidence.width());
    if width <= 0.0 {
        return None;
    }
    Some((f64::from(face.center().x) - width / 2.0) / width)
}

/// Evaluates the placement rules.
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let p = &params.geometry;
    let (w, h) = (evidence.width(), evidence.height());

    let ratio = (f64::from(w) / f64::from(p.width.max(1)))
        .min(f64::from(h) / f64::from(p.height.max(1)));
    let dims_ok = if p.exact_dimensions {
        w == p.width && h == p.height
    } else {
        ratio >= 1.0
    };
    let mut results = vec![DIMENSIONS.outcome(
        dims_ok,
        ratio,
        1.0,
        1.0,
        if p.exact_dimensions {
            format!("Image must be exactly {}x{} pixels", p.width, p.height)
        } else {
            format!("Image must be at least {}x{} pixels", p.width, p.height)
        },
    )];

    let (Some(face), Some(face_box)) = (evidence.face, evidence.face_box()) else {
        return results;
    };
    let conf = face.detection.confidence;

    if let Some(offset) = horizontal_offset(evidence) {
        let off = offset.abs();
        results.push(CENTERING.outcome(
            off <= p.centering_tolerance,
            off,
            p.centering_tolerance,
            conf * margin_confidence(off, p.centering_tolerance, 0.05),
            "Center the face horizontally",
        ));
    }

    let face_ratio = f64::from(face_box.height) / f64::from(h.max(1));
    let (ok, bound) = in_range(face_ratio, p.face_height_ratio);
    results.push(FACE_HEIGHT.outcome(
        ok,
        face_ratio,
        bound,
        conf * margin_confidence(face_ratio, bound, 0.05),
        format!(
            "Face should fill {:.0}% to {:.0}% of the image height",
            p.face_height_ratio.0 * 100.0,
            p.face_height_ratio.1 * 100.0
        ),
    ));

    let eye_ratio = f64::from(face.features.eye_center().y) / f64::from(h.max(1));
    let (ok, bound) = in_range(eye_ratio, p.eye_height_ratio);
    results.push(EYE_LINE.outcome(
        ok,
        eye_ratio,
        bound,
        conf * margin_confidence(eye_ratio, bound, 0.05),
        "Adjust framing so the eye line sits at the required height",
    ));

    #[allow(clippy::cast_precision_loss)]
    let count = evidence.face_count as f64;
    results.push(SINGLE_FACE.outcome(
        !p.single_face_only || evidence.face_count <= 1,
        count,
        1.0,
        conf,
        "Only the applicant may appear in the photo",
    ));

    results
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

    fn quality() -> QualityMetrics {
        QualityMetrics {
            sharpness_score: 100.0,
            lighting_score: 100.0,
            color_score: 100.0,
            noise_score: 100.0,
            resolution_score: 100.0,
            overall_score: 100.0,
            issues: vec![],
            suggestions: vec![],
            details: QualityDetails::default(),
        }
    }

    fn face(x: u32) -> FaceEvidence {
        let cx = x as f32 + 75.0;
        FaceEvidence {
            detection: FaceDetection {
                bbox: BoundingBox::new(x, 70, 150, 220),
                confidence: 0.9,
            },
            features: FaceFeatures {
                glasses_detected: false,
                head_covering_detected: false,
                eye_positions: (Point::new(cx - 30.0, 158.0), Point::new(cx + 30.0, 158.0)),
                mouth_position: Point::new(cx, 230.0),
                mouth_openness: 0.0,
                smile_score: 0.0,
                eye_openness: (0.9, 0.9),
                face_orientation: FaceOrientation::default(),
                feature_visibility: FeatureVisibility::default(),
            },
        }
    }

    fn find<'a>(results: &'a [RuleResult], id: &str) -> Option<&'a RuleResult> {
        results.iter().find(|r| r.rule_id == id)
    }

    #[test]
    fn test_centered_portrait_passes() {
        let image = ImageInfo::new("g.png", image::DynamicImage::new_rgb8(300, 400));
        let q = quality();
        let f = face(75);
        let evidence = ValidationEvidence::new(&image, &q).with_face(&f, 1);
        let results = evaluate(&evidence, &RuleParameters::default());
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.passes), "{results:?}");
    }

    #[test]
    fn test_off_center_is_fixable() {
        let image = ImageInfo::new("g.png", image::DynamicImage::new_rgb8(300, 400));
        let q = quality();
        let f = face(130);
        let evidence = ValidationEvidence::new(&image, &q).with_face(&f, 1);
        let offset = horizontal_offset(&evidence).unwrap_or_default();
        assert!((offset - 55.0 / 300.0).abs() < 1e-6, "offset {offset}");

        let results = evaluate(&evidence, &RuleParameters::default());
        let centering = find(&results, "ICAO.4.2.1");
        assert_eq!(centering.map(|r| r.passes), Some(false));
        assert_eq!(centering.map(|r| r.auto_fixable), Some(true));
    }

    #[test]
    fn test_small_image_is_critical() {
        let image = ImageInfo::new("g.png", image::DynamicImage::new_rgb8(150, 200));
        let q = quality();
        let evidence = ValidationEvidence::new(&image, &q);
        let results = evaluate(&evidence, &RuleParameters::default());
        assert_eq!(results.len(), 1);
        assert!(!results[0].passes);
        assert_eq!(results[0].severity, Severity::Critical);
        assert!((results[0].measured_value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ics_uae_requires_exact_size_and_tighter_face() {
        let image = ImageInfo::new("g.png", image::DynamicImage::new_rgb8(300, 400));
        let q = quality();
        let f = face(75);
        let evidence = ValidationEvidence::new(&image, &q).with_face(&f, 1);
        let results = evaluate(&evidence, &RuleParameters::for_variation(CountryVariation::IcsUae));
        assert_eq!(find(&results, "ICAO.2.1.1").map(|r| r.passes), Some(false));
        // 220 / 400 = 0.55, below 0.62
        let height = find(&results, "ICAO.4.2.2");
        assert_eq!(height.map(|r| r.passes), Some(false));
        assert_eq!(height.map(|r| r.required_value), Some(0.62));
    }

    #[test]
    fn test_second_face_fails() {
        let image = ImageInfo::new("g.png", image::DynamicImage::new_rgb8(300, 400));
        let q = quality();
        let f = face(75);
        let evidence = ValidationEvidence::new(&image, &q).with_face(&f, 2);
        let results = evaluate(&evidence, &RuleParameters::default());
        assert_eq!(find(&results, "ICAO.4.2.4").map(|r| r.passes), Some(false));
    }
}
