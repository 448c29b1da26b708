//! Eyewear rules: tinted lenses, heavy frames, glare and presence.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{BoundingBox, IssueCategory, RuleCategory, RuleResult, Severity};
use crate::imaging::{self, rgb_to_hsv, RegionStats};

const TINTED_LENSES: RuleSpec = RuleSpec {
    id: "ICAO.3.2.1",
    name: "tinted_lenses",
    category: RuleCategory::Glasses,
    issue_category: IssueCategory::Glasses,
    severity: Severity::Critical,
    auto_fixable: false,
};

const HEAVY_FRAMES: RuleSpec = RuleSpec {
    id: "ICAO.3.2.2",
    name: "heavy_frames",
    category: RuleCategory::Glasses,
    issue_category: IssueCategory::Glasses,
    severity: Severity::Major,
    auto_fixable: false,
};

const LENS_GLARE: RuleSpec = RuleSpec {
    id: "ICAO.3.2.3",
    name: "lens_glare",
    category: RuleCategory::Glasses,
    issue_category: IssueCategory::Glasses,
    severity: Severity::Major,
    auto_fixable: false,
};

const GLASSES_PRESENCE: RuleSpec = RuleSpec {
    id: "ICAO.3.2.4",
    name: "glasses_presence",
    category: RuleCategory::Glasses,
    issue_category: IssueCategory::Glasses,
    severity: Severity::Major,
    auto_fixable: false,
};

/// Lens regions and skin baseline for one face.
struct LensGeometry {
    lenses: [BoundingBox; 2],
    skin: BoundingBox,
}

#[allow(clippy::cast_precision_loss)]
fn lens_geometry(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Option<LensGeometry> {
    let face = evidence.face?;
    let (w, h) = (evidence.width(), evidence.height());
    let face_width = face.detection.bbox.width as f32;
    let lens_side = face_width * params.glasses.lens_box_ratio;
    let (left, right) = face.features.eye_positions;

    // skin baseline sits between the eye line and the mouth, over the nose
    let nose = face
        .features
        .eye_center()
        .midpoint(&face.features.mouth_position);
    let skin = BoundingBox::centered(nose.x, nose.y, face_width * 0.15, w, h);

    Some(LensGeometry {
        lenses: [
            BoundingBox::centered(left.x, left.y, lens_side, w, h),
            BoundingBox::centered(right.x, right.y, lens_side, w, h),
        ],
        skin,
    })
}

/// Largest saturation or darkening delta of the lenses against skin.
fn tint_delta(evidence: &ValidationEvidence<'_>, geometry: &LensGeometry) -> Option<f64> {
    let skin = imaging::mean_rgb(&evidence.rgb, &geometry.skin);
    if skin.is_empty() {
        return None;
    }
    let (_, skin_s, skin_v) = rgb_to_hsv(skin.mean);
    geometry
        .lenses
        .iter()
        .map(|lens| RegionStats::collect(&evidence.rgb, lens.pixels()))
        .filter(|stats| !stats.is_empty())
        .map(|lens| {
            let (_, lens_s, lens_v) = rgb_to_hsv(lens.mean);
            (lens_s - skin_s).abs().max(skin_v - lens_v)
        })
        .reduce(f64::max)
}

/// Evaluates the eyewear rules.
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let Some(face) = evidence.face else {
        return Vec::new();
    };
    let confidence = face.detection.confidence;
    let p = &params.glasses;

    if !face.features.glasses_detected {
        return vec![
            TINTED_LENSES.outcome(true, 0.0, p.max_tint_delta, confidence, ""),
            HEAVY_FRAMES.outcome(true, 0.0, p.max_frame_edge_density, confidence, ""),
            LENS_GLARE.outcome(true, 0.0, p.max_glare_ratio, confidence, ""),
            GLASSES_PRESENCE.outcome(true, 0.0, 0.0, confidence, ""),
        ];
    }

    let Some(geometry) = lens_geometry(evidence, params) else {
        return Vec::new();
    };

    let tint = tint_delta(evidence, &geometry).unwrap_or(0.0);
    let tinted = TINTED_LENSES.outcome(
        tint <= p.max_tint_delta,
        tint,
        p.max_tint_delta,
        confidence * margin_confidence(tint, p.max_tint_delta, 0.2),
        "Remove tinted glasses or use clear lenses",
    );

    let frame_density = geometry
        .lenses
        .iter()
        .map(|lens| imaging::edge_density(&evidence.luma, lens, p.edge_threshold))
        .fold(0.0, f64::max);
    let frames = HEAVY_FRAMES.outcome(
        frame_density <= p.max_frame_edge_density,
        frame_density,
        p.max_frame_edge_density,
        confidence * margin_confidence(frame_density, p.max_frame_edge_density, 0.15),
        "Frames must not cover any part of the eyes; use thin frames or remove glasses",
    );

    let glare_ratio = geometry
        .lenses
        .iter()
        .map(|lens| imaging::bright_ratio(&evidence.luma, lens, p.glare_luminance))
        .fold(0.0, f64::max);
    let glare = LENS_GLARE.outcome(
        glare_ratio <= p.max_glare_ratio,
        glare_ratio,
        p.max_glare_ratio,
        confidence * margin_confidence(glare_ratio, p.max_glare_ratio, 0.1),
        "Tilt the glasses slightly or move the light to remove reflections",
    );

    let presence = GLASSES_PRESENCE.outcome(
        p.allowed,
        1.0,
        0.0,
        confidence,
        format!("Glasses are not permitted for {} photos", params.variation),
    );

    vec![tinted, frames, glare, presence]
}
