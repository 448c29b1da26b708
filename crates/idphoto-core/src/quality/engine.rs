//! Per-image quality assessment.

use tracing::debug;

use super::{generate_quality_score, QualityConfig};
use crate::domain::{
    BoundingBox, ImageInfo, OverallQualityScore, QualityAxis, QualityDetails, QualityMetrics,
};
use crate::error::{PipelineError, Result};
use crate::imaging::{self, ExposureProfile, Histogram, RegionStats};

/// Scores sharpness, lighting, colour, noise and resolution.
#[derive(Debug, Clone, Default)]
pub struct QualityEngine {
    config: QualityConfig,
}

#[allow(clippy::cast_precision_loss)]
impl QualityEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub const fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Assesses one image.
    ///
    /// Sharpness and lighting are measured on `face_region` when given,
    /// colour on the area around it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Input`] for an image without pixels.
    pub fn assess(&self, image: &ImageInfo, face_region: Option<BoundingBox>) -> Result<QualityMetrics> {
        if image.is_empty() {
            return Err(PipelineError::Input(format!(
                "{} has no pixels ({}x{})",
                image.path, image.width, image.height
            )));
        }

        let luma = image.to_luma8();
        let rgb = image.to_rgb8();
        let whole = BoundingBox::new(0, 0, image.width, image.height);
        let region = face_region
            .map(|r| r.clamp_to(image.width, image.height))
            .filter(|r| r.area() > 0)
            .unwrap_or(whole);

        let laplacian_variance = imaging::laplacian_variance(&luma, Some(&region));
        let sharpness_score = ratio_score(laplacian_variance / self.config.sharpness_reference);

        let histogram = Histogram::from_region(&luma, &region);
        let exposure = ExposureProfile::from_histogram(&histogram);
        let lighting_score = 100.0 * (1.0 - f64::from(exposure.worst()));

        let color_cast = neutral_cast(&rgb, face_region.as_ref());
        let color_score = 100.0 * (1.0 - color_cast / self.config.color_cast_reference);

        let noise_sigma = imaging::block_noise_sigma(&luma, self.config.noise_block);
        let noise_score = 100.0 * (1.0 - noise_sigma / self.config.noise_reference);

        let resolution_ratio = (f64::from(image.width) / f64::from(self.config.min_width.max(1)))
            .min(f64::from(image.height) / f64::from(self.config.min_height.max(1)));
        let resolution_score = ratio_score(resolution_ratio);

        let scores = [
            sharpness_score,
            lighting_score,
            color_score,
            noise_score,
            resolution_score,
        ]
        .map(|s| s.clamp(0.0, 100.0));
        let overall_score = self.combine(scores);

        let details = QualityDetails {
            laplacian_variance,
            mean_luminance: exposure.mean,
            under_exposure: exposure.under_score,
            over_exposure: exposure.over_score,
            color_cast,
            noise_sigma,
            resolution_ratio,
        };

        let mut metrics = QualityMetrics {
            sharpness_score: scores[0],
            lighting_score: scores[1],
            color_score: scores[2],
            noise_score: scores[3],
            resolution_score: scores[4],
            overall_score,
            issues: Vec::new(),
            suggestions: Vec::new(),
            details,
        };

        for axis in QualityAxis::ALL {
            let score = metrics.score(axis);
            if score < self.config.thresholds.get(axis) {
                let (issue, suggestion) = self.describe(axis, score, &details);
                metrics.issues.push(issue);
                metrics.suggestions.push(suggestion);
            }
        }

        debug!(
            "Quality for {}: overall={:.1} sharp={:.1} light={:.1} color={:.1} noise={:.1} res={:.1}",
            image.path,
            overall_score,
            scores[0],
            scores[1],
            scores[2],
            scores[3],
            scores[4]
        );

        Ok(metrics)
    }

    /// Weighted overall score for sub-scores in [`QualityAxis::ALL`] order.
    ///
    /// Non-decreasing in every sub-score.
    #[must_use]
    pub fn combine(&self, scores: [f64; 5]) -> f64 {
        let weights = &self.config.weights;
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = QualityAxis::ALL
            .iter()
            .zip(scores)
            .map(|(axis, score)| weights.get(*axis) * score)
            .sum();
        (weighted / total).clamp(0.0, 100.0)
    }

    /// Aggregates repeated measurements against the configured minimum.
    #[must_use]
    pub fn generate_quality_score(&self, metrics: &[QualityMetrics]) -> OverallQualityScore {
        generate_quality_score(metrics, self.config.minimum_overall)
    }

    fn describe(&self, axis: QualityAxis, score: f64, details: &QualityDetails) -> (String, String) {
        match axis {
            QualityAxis::Sharpness => (
                format!("Image is not sharp enough (sharpness {score:.0}/100)"),
                "Focus on the eyes and avoid camera shake".to_string(),
            ),
            QualityAxis::Lighting if details.under_exposure >= details.over_exposure => (
                format!("Face is underexposed (lighting {score:.0}/100)"),
                "Add even, diffuse light in front of the subject".to_string(),
            ),
            QualityAxis::Lighting => (
                format!("Face is overexposed (lighting {score:.0}/100)"),
                "Reduce light intensity or move the light source further away".to_string(),
            ),
            QualityAxis::Color => (
                format!("Colour cast detected (colour {score:.0}/100)"),
                "Use neutral white balance and a neutral background".to_string(),
            ),
            QualityAxis::Noise => (
                format!("Image is noisy (noise {score:.0}/100)"),
                "Use a lower ISO setting or more light".to_string(),
            ),
            QualityAxis::Resolution => (
                format!(
                    "Resolution below the required {}x{}",
                    self.config.min_width, self.config.min_height
                ),
                "Use a higher resolution camera or a less cropped original".to_string(),
            ),
        }
    }
}

fn ratio_score(ratio: f64) -> f64 {
    (ratio * 100.0).clamp(0.0, 100.0)
}

/// Channel spread (0.0 to 1.0) on areas expected to be neutral.
///
/// With a face region, everything outside the region grown by 20% is
/// sampled; otherwise the whole image is.
fn neutral_cast(rgb: &image::RgbImage, face_region: Option<&BoundingBox>) -> f64 {
    let (w, h) = rgb.dimensions();
    let stats = match face_region {
        Some(face) => {
            let subject = face.expand(0.2, w, h);
            let around = RegionStats::collect(
                rgb,
                BoundingBox::new(0, 0, w, h)
                    .pixels()
                    .filter(|&(x, y)| !subject.contains(x, y)),
            );
            if around.is_empty() {
                imaging::mean_rgb(rgb, &BoundingBox::new(0, 0, w, h))
            } else {
                around
            }
        }
        None => imaging::mean_rgb(rgb, &BoundingBox::new(0, 0, w, h)),
    };
    let max = stats.mean.iter().copied().fold(f64::MIN, f64::max);
    let min = stats.mean.iter().copied().fold(f64::MAX, f64::min);
    ((max - min) / 255.0).clamp(0.0, 1.0)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn textured(width: u32, height: u32) -> ImageInfo {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            if ((x / 8) + (y / 8)) % 2 == 0 {
                image::Rgb([170, 170, 170])
            } else {
                image::Rgb([110, 110, 110])
            }
        });
        ImageInfo::new("textured.png", image::DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_empty_image_is_input_error() {
        let info = ImageInfo::new("empty.png", image::DynamicImage::new_rgb8(0, 0));
        let err = QualityEngine::default().assess(&info, None).unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)), "got {err:?}");
    }

    #[test]
    fn test_textured_neutral_image_scores_high() {
        let metrics = QualityEngine::default()
            .assess(&textured(400, 500), None)
            .expect("assessment should succeed");

        assert!((metrics.sharpness_score - 100.0).abs() < 1e-9);
        assert!((metrics.color_score - 100.0).abs() < 1e-9);
        assert!((metrics.noise_score - 100.0).abs() < 1e-9);
        assert!((metrics.resolution_score - 100.0).abs() < 1e-9);
        assert!(metrics.overall_score >= 90.0, "got {}", metrics.overall_score);
        assert!(metrics.issues.is_empty(), "unexpected {:?}", metrics.issues);
    }

    #[test]
    fn test_small_flat_dark_image_reports_issues() {
        let img = image::RgbImage::from_fn(150, 200, |_, _| image::Rgb([5, 5, 5]));
        let info = ImageInfo::new("dark.png", image::DynamicImage::ImageRgb8(img));
        let metrics = QualityEngine::default()
            .assess(&info, None)
            .expect("assessment should succeed");

        assert!(metrics.sharpness_score < 1.0);
        assert!(metrics.lighting_score < 60.0);
        assert!((metrics.resolution_score - 50.0).abs() < 1e-9);
        assert_eq!(metrics.issues.len(), metrics.suggestions.len());
        assert!(metrics.issues.iter().any(|i| i.contains("underexposed")));
        assert!(metrics.issues.iter().any(|i| i.contains("Resolution")));
    }

    #[test]
    fn test_colour_cast_measured_outside_face() {
        let img = image::RgbImage::from_fn(300, 400, |x, y| {
            if (100..200).contains(&x) && (100..250).contains(&y) {
                image::Rgb([220, 150, 120])
            } else {
                image::Rgb([250, 250, 250])
            }
        });
        let info = ImageInfo::new("portrait.png", image::DynamicImage::ImageRgb8(img));
        let face = BoundingBox::new(100, 100, 100, 150);
        let engine = QualityEngine::default();

        let with_face = engine.assess(&info, Some(face)).expect("assess");
        let without = engine.assess(&info, None).expect("assess");
        assert!((with_face.color_score - 100.0).abs() < 1e-9);
        assert!(without.color_score < with_face.color_score);
    }

    #[test]
    fn test_combine_is_monotonic() {
        let engine = QualityEngine::default();
        let base = [50.0, 60.0, 70.0, 80.0, 90.0];
        let overall = engine.combine(base);
        for i in 0..5 {
            let mut raised = base;
            raised[i] += 10.0;
            assert!(
                engine.combine(raised) >= overall,
                "raising axis {i} lowered the overall score"
            );
        }
    }
}
