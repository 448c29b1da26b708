//! Pixel-level correction primitives.

use std::sync::Arc;

use anyhow::{Context, Result};
use idphoto_core::domain::{BackgroundMask, CorrectionKind, CorrectionParameters};
use idphoto_core::ports::CorrectionPrimitive;
use image::{Rgb, RgbImage};
use tracing::debug;

/// The three built-in primitives.
#[must_use]
pub fn default_corrections() -> Vec<Arc<dyn CorrectionPrimitive>> {
    vec![
        Arc::new(BackgroundFill),
        Arc::new(LightingGain::default()),
        Arc::new(GeometryCorrection),
    ]
}

fn luma(pixel: [u8; 3]) -> f32 {
    0.299 * f32::from(pixel[0]) + 0.587 * f32::from(pixel[1]) + 0.114 * f32::from(pixel[2])
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Blends background pixels towards the target backdrop colour.
///
/// Requires the background mask of the current image.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackgroundFill;

impl CorrectionPrimitive for BackgroundFill {
    fn kind(&self) -> CorrectionKind {
        CorrectionKind::BackgroundCorrection
    }

    fn apply(&self, image: &RgbImage, params: &CorrectionParameters) -> Result<RgbImage> {
        let mask = params
            .mask
            .as_ref()
            .filter(|m| m.fits(image.width(), image.height()))
            .context("background correction needs a mask matching the image")?;
        let strength = params.strength.clamp(0.0, 1.0);
        let target = params.background_color.map(f32::from);

        let mut out = image.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if mask.is_background(x, y) {
                let current = pixel.0.map(f32::from);
                *pixel = Rgb(std::array::from_fn(|c| {
                    to_u8(current[c] + (target[c] - current[c]) * strength)
                }));
            }
        }
        debug!(
            "background filled with {:?} at strength {strength:.2}",
            params.background_color
        );
        Ok(out)
    }
}

/// Evens out subject exposure.
///
/// The subject (non-background pixels, or the whole frame without a mask)
/// is split at its horizontal centre and each half is gained towards the
/// target luminance, which also removes one-sided shadows.
#[derive(Debug, Clone, Copy)]
pub struct LightingGain {
    /// Largest gain applied to either half.
    pub max_gain: f32,
}

impl Default for LightingGain {
    fn default() -> Self {
        Self { max_gain: 2.0 }
    }
}

impl LightingGain {
    fn is_subject(mask: Option<&BackgroundMask>, x: u32, y: u32) -> bool {
        mask.map_or(true, |m| !m.is_background(x, y))
    }
}

impl CorrectionPrimitive for LightingGain {
    fn kind(&self) -> CorrectionKind {
        CorrectionKind::LightingCorrection
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply(&self, image: &RgbImage, params: &CorrectionParameters) -> Result<RgbImage> {
        let mask = params
            .mask
            .as_deref()
            .filter(|m| m.fits(image.width(), image.height()));

        let (mut min_x, mut max_x) = (u32::MAX, 0);
        for (x, y, _) in image.enumerate_pixels() {
            if Self::is_subject(mask, x, y) {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        if min_x > max_x {
            debug!("no subject pixels; lighting unchanged");
            return Ok(image.clone());
        }
        let mid = min_x + (max_x - min_x + 1) / 2;

        let mut sums = [(0.0f64, 0u64); 2];
        for (x, y, pixel) in image.enumerate_pixels() {
            if Self::is_subject(mask, x, y) {
                let half = usize::from(x >= mid);
                sums[half].0 += f64::from(luma(pixel.0));
                sums[half].1 += 1;
            }
        }

        let strength = params.strength.clamp(0.0, 1.0);
        let gains = sums.map(|(sum, n)| {
            if n == 0 || sum <= 0.0 {
                return 1.0;
            }
            let mean = (sum / n as f64) as f32;
            let full = (params.target_luminance / mean).clamp(1.0 / self.max_gain, self.max_gain);
            1.0 + (full - 1.0) * strength
        });

        let mut out = image.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if Self::is_subject(mask, x, y) {
                let gain = gains[usize::from(x >= mid)];
                *pixel = Rgb(pixel.0.map(|c| to_u8(f32::from(c) * gain)));
            }
        }
        debug!("lighting gains {:.2}/{:.2}", gains[0], gains[1]);
        Ok(out)
    }
}

/// Levels head tilt and re-centres the subject.
///
/// Rotates by the opposite of `roll_degrees` about the image centre and
/// shifts right by `horizontal_shift`, both scaled by strength. Uncovered
/// pixels take the backdrop colour.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeometryCorrection;

impl CorrectionPrimitive for GeometryCorrection {
    fn kind(&self) -> CorrectionKind {
        CorrectionKind::GeometryCorrection
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn apply(&self, image: &RgbImage, params: &CorrectionParameters) -> Result<RgbImage> {
        let strength = params.strength.clamp(0.0, 1.0);
        let angle = (-params.roll_degrees * strength).to_radians();
        let shift = params.horizontal_shift * strength;
        let (w, h) = image.dimensions();
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let (sin, cos) = angle.sin_cos();
        let fill = Rgb(params.background_color);

        // inverse mapping: undo the shift, then rotate back by `angle`
        let out = RgbImage::from_fn(w, h, |x, y| {
            let dx = x as f32 + 0.5 - shift - cx;
            let dy = y as f32 + 0.5 - cy;
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                fill
            } else {
                *image.get_pixel(sx as u32, sy as u32)
            }
        });
        debug!(
            "geometry corrected: rotated {:.1} deg, shifted {shift:.1} px",
            angle.to_degrees()
        );
        Ok(out)
    }
}
