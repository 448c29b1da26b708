//! Spatial filters and region statistics.

use crate::domain::BoundingBox;

/// Per-channel mean and standard deviation of a set of RGB pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionStats {
    /// Channel means.
    pub mean: [f64; 3],
    /// Channel standard deviations.
    pub std_dev: [f64; 3],
    /// Number of pixels sampled.
    pub count: u64,
}

impl RegionStats {
    /// Collects statistics over the given pixel coordinates.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn collect(image: &image::RgbImage, coords: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut sum = [0f64; 3];
        let mut sum_sq = [0f64; 3];
        let mut count = 0u64;
        for (x, y) in coords {
            if x >= image.width() || y >= image.height() {
                continue;
            }
            let px = image.get_pixel(x, y).0;
            for c in 0..3 {
                let v = f64::from(px[c]);
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            count += 1;
        }
        if count == 0 {
            return Self::default();
        }
        let n = count as f64;
        let mean = sum.map(|s| s / n);
        let mut std_dev = [0f64; 3];
        for c in 0..3 {
            std_dev[c] = (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt();
        }
        Self {
            mean,
            std_dev,
            count,
        }
    }

    /// Whether no pixel was sampled.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Euclidean RGB distance between the mean and `target`.
    #[must_use]
    pub fn distance_to(&self, target: [u8; 3]) -> f64 {
        (0..3)
            .map(|c| (self.mean[c] - f64::from(target[c])).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Mean channel standard deviation.
    #[must_use]
    pub fn spread(&self) -> f64 {
        self.std_dev.iter().sum::<f64>() / 3.0
    }
}

/// Mean RGB over a region.
#[must_use]
pub fn mean_rgb(image: &image::RgbImage, region: &BoundingBox) -> RegionStats {
    RegionStats::collect(image, region.clamp_to(image.width(), image.height()).pixels())
}

/// Variance of the 4-neighbour Laplacian inside `region` (whole image if `None`).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn laplacian_variance(luma: &image::GrayImage, region: Option<&BoundingBox>) -> f64 {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let region = region.map_or_else(
        || BoundingBox::new(0, 0, w, h),
        |r| r.clamp_to(w, h),
    );
    let x0 = region.x.max(1);
    let y0 = region.y.max(1);
    let x1 = region.right().min(w - 1);
    let y1 = region.bottom().min(h - 1);

    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            let center = f64::from(luma.get_pixel(x, y).0[0]);
            let neighbours = f64::from(luma.get_pixel(x - 1, y).0[0])
                + f64::from(luma.get_pixel(x + 1, y).0[0])
                + f64::from(luma.get_pixel(x, y - 1).0[0])
                + f64::from(luma.get_pixel(x, y + 1).0[0]);
            let lap = neighbours - 4.0 * center;
            sum += lap;
            sum_sq += lap * lap;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Sobel gradient magnitude at an interior pixel; 0 on the image border.
#[must_use]
pub fn sobel_magnitude(luma: &image::GrayImage, x: u32, y: u32) -> f64 {
    let (w, h) = luma.dimensions();
    if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
        return 0.0;
    }
    let px = |x: u32, y: u32| f64::from(luma.get_pixel(x, y).0[0]);
    let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
        - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
    let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
        - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
    gx.hypot(gy)
}

/// Fraction of pixels in `region` whose Sobel gradient magnitude exceeds `threshold`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn edge_density(luma: &image::GrayImage, region: &BoundingBox, threshold: f64) -> f64 {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let region = region.clamp_to(w, h);

    let mut edges = 0u64;
    let mut count = 0u64;
    for y in region.y.max(1)..region.bottom().min(h - 1) {
        for x in region.x.max(1)..region.right().min(w - 1) {
            if sobel_magnitude(luma, x, y) > threshold {
                edges += 1;
            }
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        edges as f64 / count as f64
    }
}

/// Fraction of pixels in `region` with luminance at or above `threshold`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn bright_ratio(luma: &image::GrayImage, region: &BoundingBox, threshold: u8) -> f64 {
    let region = region.clamp_to(luma.width(), luma.height());
    if region.area() == 0 {
        return 0.0;
    }
    let bright = region
        .pixels()
        .filter(|&(x, y)| luma.get_pixel(x, y).0[0] >= threshold)
        .count();
    bright as f64 / region.area() as f64
}

/// Noise estimate: median standard deviation over `block`-sized tiles.
///
/// Structure raises a minority of tiles, so the median tracks the sensor
/// noise on the flat majority.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn block_noise_sigma(luma: &image::GrayImage, block: u32) -> f64 {
    let (w, h) = luma.dimensions();
    let block = block.max(2);
    let mut sigmas = Vec::new();
    let mut by = 0;
    while by + block <= h {
        let mut bx = 0;
        while bx + block <= w {
            let mut sum = 0f64;
            let mut sum_sq = 0f64;
            for y in by..by + block {
                for x in bx..bx + block {
                    let v = f64::from(luma.get_pixel(x, y).0[0]);
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let n = f64::from(block * block);
            let mean = sum / n;
            sigmas.push((sum_sq / n - mean * mean).max(0.0).sqrt());
            bx += block;
        }
        by += block;
    }
    if sigmas.is_empty() {
        return 0.0;
    }
    sigmas.sort_by(f64::total_cmp);
    sigmas[sigmas.len() / 2]
}

/// Converts an RGB pixel to HSV (hue in degrees, saturation and value 0.0 to 1.0).
#[must_use]
pub fn rgb_to_hsv(rgb: [f64; 3]) -> (f64, f64, f64) {
    let [r, g, b] = rgb.map(|c| (c / 255.0).clamp(0.0, 1.0));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f64::EPSILON {
        0.0
    } else if (max - r).abs() <= f64::EPSILON {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if (max - g).abs() <= f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f64::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laplacian_flat_vs_checker() {
        let flat = image::GrayImage::from_fn(40, 40, |_, _| image::Luma([120u8]));
        let checker = image::GrayImage::from_fn(40, 40, |x, y| {
            image::Luma([if (x + y) % 2 == 0 { 0u8 } else { 255u8 }])
        });
        assert!(laplacian_variance(&flat, None) < 1e-9);
        assert!(laplacian_variance(&checker, None) > 10_000.0);
    }

    #[test]
    fn test_edge_density_detects_boundary() {
        let img = image::GrayImage::from_fn(20, 20, |x, _| image::Luma([if x < 10 { 0u8 } else { 255u8 }]));
        let all = BoundingBox::new(0, 0, 20, 20);
        let density = edge_density(&img, &all, 100.0);
        // two edge columns out of eighteen interior columns
        assert!((density - 2.0 / 18.0).abs() < 1e-9, "got {density}");
    }

    #[test]
    fn test_bright_ratio() {
        let img = image::GrayImage::from_fn(10, 10, |x, _| image::Luma([if x < 3 { 250u8 } else { 10u8 }]));
        let ratio = bright_ratio(&img, &BoundingBox::new(0, 0, 10, 10), 240);
        assert!((ratio - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_block_noise_ignores_minority_structure() {
        let img = image::GrayImage::from_fn(64, 64, |x, y| {
            if x < 8 && y < 8 && (x + y) % 2 == 0 {
                image::Luma([255u8])
            } else {
                image::Luma([100u8])
            }
        });
        assert!(block_noise_sigma(&img, 8) < 1e-9);
    }

    #[test]
    fn test_hsv() {
        let (h, s, v) = rgb_to_hsv([255.0, 0.0, 0.0]);
        assert!(h.abs() < 1e-9 && (s - 1.0).abs() < 1e-9 && (v - 1.0).abs() < 1e-9);
        let (_, s, v) = rgb_to_hsv([128.0, 128.0, 128.0]);
        assert!(s.abs() < 1e-9);
        assert!((v - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_stats_distance() {
        let img = image::RgbImage::from_fn(4, 4, |_, _| image::Rgb([250, 250, 250]));
        let stats = mean_rgb(&img, &BoundingBox::new(0, 0, 4, 4));
        assert_eq!(stats.count, 16);
        assert!((stats.distance_to([255, 255, 255]) - 75f64.sqrt()).abs() < 1e-9);
        assert!(stats.spread() < 1e-9);
    }
}
