//! Luminance histogram and exposure profile.

use crate::domain::BoundingBox;

/// 256-bin histogram of luminance values.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: [u64; 256],
    total: u64,
}

impl Histogram {
    /// Histogram of a whole grayscale image.
    #[must_use]
    pub fn from_luma(image: &image::GrayImage) -> Self {
        let mut bins = [0u64; 256];
        for pixel in image.pixels() {
            bins[usize::from(pixel.0[0])] += 1;
        }
        let total = bins.iter().sum();
        Self { bins, total }
    }

    /// Histogram of the pixels inside `region`, clipped to the image.
    #[must_use]
    pub fn from_region(image: &image::GrayImage, region: &BoundingBox) -> Self {
        let region = region.clamp_to(image.width(), image.height());
        let mut bins = [0u64; 256];
        for (x, y) in region.pixels() {
            bins[usize::from(image.get_pixel(x, y).0[0])] += 1;
        }
        let total = bins.iter().sum();
        Self { bins, total }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Luminance at percentile `p` (0.0 to 1.0).
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn percentile(&self, p: f64) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let target = (self.total as f64 * p.clamp(0.0, 1.0)).round() as u64;
        let mut cumulative = 0u64;
        for (i, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target.max(1) {
                return i as u8;
            }
        }
        255
    }

    /// Mean luminance.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &count)| (i as u64) * count)
            .sum();
        sum as f64 / self.total as f64
    }

    /// Standard deviation of luminance.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let diff = (i as f64) - mean;
                diff * diff * (count as f64)
            })
            .sum::<f64>()
            / (self.total as f64);
        variance.sqrt()
    }

    /// Fraction of pixels at or below `threshold`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fraction_below(&self, threshold: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count: u64 = self.bins[..=usize::from(threshold)].iter().sum();
        count as f64 / self.total as f64
    }

    /// Fraction of pixels at or above `threshold`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fraction_above(&self, threshold: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count: u64 = self.bins[usize::from(threshold)..].iter().sum();
        count as f64 / self.total as f64
    }
}

/// Under/over exposure of a luminance distribution.
#[derive(Debug, Clone)]
pub struct ExposureProfile {
    /// 5th percentile luminance.
    pub p5: u8,
    /// 95th percentile luminance.
    pub p95: u8,
    /// Mean luminance.
    pub mean: f64,
    /// Underexposure score (0.0 to 1.0).
    pub under_score: f32,
    /// Overexposure score (0.0 to 1.0).
    pub over_score: f32,
}

impl ExposureProfile {
    /// Pixels at or below this are clipped shadows.
    pub const SHADOW_CLIP: u8 = 8;
    /// Pixels at or above this are clipped highlights.
    pub const HIGHLIGHT_CLIP: u8 = 247;

    /// Profiles a histogram.
    #[must_use]
    pub fn from_histogram(histogram: &Histogram) -> Self {
        let p5 = histogram.percentile(0.05);
        let p95 = histogram.percentile(0.95);
        let mean = histogram.mean();
        let shadow_fraction = histogram.fraction_below(Self::SHADOW_CLIP);
        let highlight_fraction = histogram.fraction_above(Self::HIGHLIGHT_CLIP);

        Self {
            p5,
            p95,
            mean,
            under_score: under_score(p5, shadow_fraction, mean),
            over_score: over_score(p95, highlight_fraction, mean),
        }
    }

    /// The worse of the two exposure scores.
    #[must_use]
    pub fn worst(&self) -> f32 {
        self.under_score.max(self.over_score)
    }
}

// Dark 5th percentile, clipped shadows and a low mean all count towards
// underexposure.
#[allow(clippy::cast_possible_truncation)]
fn under_score(p5: u8, shadow_fraction: f64, mean: f64) -> f32 {
    let p5_score = if p5 < 16 {
        (16.0 - f64::from(p5)) / 16.0
    } else {
        0.0
    };
    let shadow_score = (shadow_fraction / 0.15).min(1.0);
    let mean_score = if mean < 50.0 { (50.0 - mean) / 50.0 } else { 0.0 };

    let combined = p5_score * 0.4 + shadow_score * 0.4 + mean_score * 0.2;
    (combined as f32).clamp(0.0, 1.0)
}

#[allow(clippy::cast_possible_truncation)]
fn over_score(p95: u8, highlight_fraction: f64, mean: f64) -> f32 {
    let p95_score = if p95 > 240 {
        f64::from(p95 - 240) / 15.0
    } else {
        0.0
    };
    let highlight_score = (highlight_fraction / 0.15).min(1.0);
    let mean_score = if mean > 200.0 {
        (mean - 200.0) / 55.0
    } else {
        0.0
    };

    let combined = p95_score * 0.4 + highlight_score * 0.4 + mean_score * 0.2;
    (combined as f32).clamp(0.0, 1.0)
}
