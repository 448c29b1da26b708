//! Transforms used by error recovery before retrying a stage.

use image::imageops::FilterType;

use super::Histogram;
use crate::domain::ImageInfo;

/// Percentile contrast stretch on luminance bounds.
///
/// `attempt` (1-based) widens the clipped tails by one percent per attempt,
/// so each retry sees a stronger enhancement.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn enhance_contrast(image: &ImageInfo, attempt: u32) -> ImageInfo {
    let clip = 0.01 * f64::from(attempt.max(1));
    let histogram = Histogram::from_luma(&image.to_luma8());
    let low = f64::from(histogram.percentile(clip));
    let high = f64::from(histogram.percentile(1.0 - clip));

    let mut rgb = image.to_rgb8();
    if high - low < 1.0 {
        return image.with_rgb(rgb);
    }
    let scale = 255.0 / (high - low);
    for pixel in rgb.pixels_mut() {
        for channel in &mut pixel.0 {
            let stretched = (f64::from(*channel) - low) * scale;
            *channel = stretched.round().clamp(0.0, 255.0) as u8;
        }
    }
    image.with_rgb(rgb)
}

/// Resizes by `factor` (0.0 to 1.0), never below one pixel per side.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn downscale(image: &ImageInfo, factor: f32) -> ImageInfo {
    let factor = factor.clamp(0.01, 1.0);
    let width = ((image.width as f32 * factor).round() as u32).max(1);
    let height = ((image.height as f32 * factor).round() as u32).max(1);
    let resized = image.image.resize_exact(width, height, FilterType::Triangle);
    ImageInfo::new(image.path.clone(), resized)
}
