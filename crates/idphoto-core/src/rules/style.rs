//! Background, shadow, flash and red-eye rules.

use super::evidence::ValidationEvidence;
use super::params::RuleParameters;
use super::rule::{margin_confidence, RuleSpec};
use crate::domain::{
    BackgroundMask, BoundingBox, IssueCategory, RuleCategory, RuleResult, Severity,
};
use crate::imaging::{self, RegionStats};

const BACKGROUND_COLOR: RuleSpec = RuleSpec {
    id: "ICAO.6.1.1",
    name: "background_color",
    category: RuleCategory::StyleLighting,
    issue_category: IssueCategory::Background,
    severity: Severity::Major,
    auto_fixable: true,
};

const BACKGROUND_UNIFORMITY: RuleSpec = RuleSpec {
    id: "ICAO.6.1.2",
    name: "background_uniformity",
    category: RuleCategory::StyleLighting,
    issue_category: IssueCategory::Background,
    severity: Severity::Minor,
    auto_fixable: true,
};

const SHADOWS: RuleSpec = RuleSpec {
    id: "ICAO.6.2.1",
    name: "shadows",
    category: RuleCategory::StyleLighting,
    issue_category: IssueCategory::Lighting,
    severity: Severity::Major,
    auto_fixable: true,
};

const FLASH_REFLECTION: RuleSpec = RuleSpec {
    id: "ICAO.6.2.2",
    name: "flash_reflection",
    category: RuleCategory::StyleLighting,
    issue_category: IssueCategory::Lighting,
    severity: Severity::Minor,
    auto_fixable: true,
};

const RED_EYE: RuleSpec = RuleSpec {
    id: "ICAO.6.2.3",
    name: "red_eye",
    category: RuleCategory::StyleLighting,
    issue_category: IssueCategory::Lighting,
    severity: Severity::Major,
    auto_fixable: false,
};

/// Spread (mean channel std-dev) at which uniformity reaches zero.
const UNIFORMITY_SPREAD: f64 = 64.0;

fn background_stats(evidence: &ValidationEvidence<'_>, mask: &BackgroundMask) -> RegionStats {
    let (w, h) = (evidence.width(), evidence.height());
    let coords = (0..h).flat_map(move |y| (0..w).map(move |x| (x, y)));
    RegionStats::collect(
        &evidence.rgb,
        coords.filter(|&(x, y)| mask.is_interior_background(x, y)),
    )
}

#[allow(clippy::cast_precision_loss)]
fn mean_luma(luma: &image::GrayImage, coords: impl Iterator<Item = (u32, u32)>) -> Option<f64> {
    let (sum, n) = coords.fold((0u64, 0u64), |(sum, n), (x, y)| {
        (sum + u64::from(luma.get_pixel(x, y).0[0]), n + 1)
    });
    (n > 0).then(|| sum as f64 / n as f64)
}

fn imbalance(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a.max(b) > 0.0 => (a - b).abs() / a.max(b),
        _ => 0.0,
    }
}

/// Luminance below which a pixel is a shadow candidate.
const SHADOW_DARK: u8 = 100;
/// Mean Sobel magnitude over shadow candidates at which the gradient term saturates.
const SHADOW_GRADIENT_SCALE: f64 = 50.0;
/// Share of a region that must be dark before its gradient energy counts.
const SHADOW_MIN_COVERAGE: f64 = 0.05;

/// Gradient energy of the dark pixels in a region, 0.0-1.0.
#[allow(clippy::cast_precision_loss)]
fn dark_gradient_energy(luma: &image::GrayImage, coords: impl Iterator<Item = (u32, u32)>) -> f64 {
    let (mut energy, mut dark, mut total) = (0.0, 0u64, 0u64);
    for (x, y) in coords {
        total += 1;
        if luma.get_pixel(x, y).0[0] < SHADOW_DARK {
            dark += 1;
            energy += imaging::sobel_magnitude(luma, x, y);
        }
    }
    if dark == 0 || (dark as f64) < total as f64 * SHADOW_MIN_COVERAGE {
        return 0.0;
    }
    (energy / dark as f64 / SHADOW_GRADIENT_SCALE).min(1.0)
}

/// Shadow intensity: the stronger of the luminance imbalance across the face
/// halves and background bands, and the gradient energy along dark edges in
/// the face and in those bands.
fn shadow_intensity(
    evidence: &ValidationEvidence<'_>,
    face: &BoundingBox,
    mask: &BackgroundMask,
) -> f64 {
    let (w, h) = (evidence.width(), evidence.height());
    let luma = &evidence.luma;
    let mid = face.x + face.width / 2;
    let left_face = mean_luma(luma, face.pixels().filter(|&(x, _)| x < mid));
    let right_face = mean_luma(luma, face.pixels().filter(|&(x, _)| x >= mid));

    let inner = face.expand(0.2, w, h);
    let outer = face.expand(0.5, w, h);
    let band = |left: bool| {
        let (x0, x1) = if left {
            (outer.x, inner.x)
        } else {
            (inner.right(), outer.right())
        };
        BoundingBox::new(x0, face.y, x1.saturating_sub(x0), face.height).clamp_to(w, h)
    };
    let (left_band, right_band) = (band(true), band(false));
    let backdrop = |region: &BoundingBox| {
        region
            .pixels()
            .filter(|&(x, y)| mask.is_interior_background(x, y))
            .collect::<Vec<_>>()
    };
    let (left_bg, right_bg) = (backdrop(&left_band), backdrop(&right_band));

    let balance = imbalance(left_face, right_face).max(imbalance(
        mean_luma(luma, left_bg.iter().copied()),
        mean_luma(luma, right_bg.iter().copied()),
    ));
    let gradient = dark_gradient_energy(luma, face.clamp_to(w, h).pixels())
        .max(dark_gradient_energy(luma, left_bg.into_iter()))
        .max(dark_gradient_energy(luma, right_bg.into_iter()));
    balance.max(gradient)
}

/// Fraction of strongly red-dominant pixels in the worse eye.
#[allow(clippy::cast_precision_loss)]
fn red_eye_ratio(evidence: &ValidationEvidence<'_>, face_width: f32) -> f64 {
    let Some(face) = evidence.face else {
        return 0.0;
    };
    let (w, h) = (evidence.width(), evidence.height());
    let side = (face_width * 0.1).max(4.0);
    let (left, right) = face.features.eye_positions;
    [left, right]
        .iter()
        .map(|eye| {
            let region = BoundingBox::centered(eye.x, eye.y, side, w, h);
            if region.area() == 0 {
                return 0.0;
            }
            let red = region
                .pixels()
                .filter(|&(x, y)| {
                    let [r, g, b] = evidence.rgb.get_pixel(x, y).0;
                    r > 150 && f64::from(r) > 1.8 * f64::from(g.max(b))
                })
                .count();
            red as f64 / region.area() as f64
        })
        .fold(0.0, f64::max)
}

/// Evaluates the background and lighting rules.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(evidence: &ValidationEvidence<'_>, params: &RuleParameters) -> Vec<RuleResult> {
    let (Some(face), Some(face_box), Some(mask)) =
        (evidence.face, evidence.face_box(), evidence.background_mask())
    else {
        return Vec::new();
    };
    let p = &params.style;
    let detector_confidence = face.detection.confidence;

    let stats = background_stats(evidence, &mask);
    let (color, uniformity) = if stats.is_empty() {
        (
            BACKGROUND_COLOR.outcome(
                false,
                0.0,
                p.background_tolerance,
                0.2,
                "No background visible; leave space around the head",
            ),
            BACKGROUND_UNIFORMITY.outcome(
                false,
                0.0,
                p.min_uniformity,
                0.2,
                "No background visible; leave space around the head",
            ),
        )
    } else {
        let distance = stats.distance_to(p.background_color);
        let [r, g, b] = p.background_color;
        let color = BACKGROUND_COLOR.outcome(
            distance <= p.background_tolerance,
            distance,
            p.background_tolerance,
            margin_confidence(distance, p.background_tolerance, p.background_tolerance / 2.0),
            format!("Use a plain background close to RGB({r}, {g}, {b})"),
        );
        let score = (1.0 - stats.spread() / UNIFORMITY_SPREAD).clamp(0.0, 1.0);
        let uniformity = BACKGROUND_UNIFORMITY.outcome(
            score >= p.min_uniformity,
            score,
            p.min_uniformity,
            margin_confidence(score, p.min_uniformity, 0.1),
            "Use a plain background without patterns or objects",
        );
        (color, uniformity)
    };

    let shadow = shadow_intensity(evidence, &face_box, &mask);
    let shadows = SHADOWS.outcome(
        shadow <= p.max_shadow,
        shadow,
        p.max_shadow,
        detector_confidence * margin_confidence(shadow, p.max_shadow, 0.1),
        "Light the face evenly from both sides to avoid shadows",
    );

    let flash_ratio = imaging::bright_ratio(&evidence.luma, &face_box, p.flash_luminance);
    let flash = FLASH_REFLECTION.outcome(
        flash_ratio <= p.max_flash_ratio,
        flash_ratio,
        p.max_flash_ratio,
        detector_confidence * margin_confidence(flash_ratio, p.max_flash_ratio, 0.05),
        "Avoid direct flash; hot spots on the skin must not be visible",
    );

    let red = red_eye_ratio(evidence, face_box.width as f32);
    let red_eye = RED_EYE.outcome(
        red <= p.max_red_eye_ratio,
        red,
        p.max_red_eye_ratio,
        detector_confidence * margin_confidence(red, p.max_red_eye_ratio, 0.2),
        "Retake without red-eye; diffuse the flash or increase ambient light",
    );

    vec![color, uniformity, shadows, flash, red_eye]
}
