//! Border-colour background segmentation.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use idphoto_core::domain::{BackgroundMask, ImageInfo};
use idphoto_core::ports::BackgroundSegmenter;
use image::RgbImage;
use tracing::debug;

/// Segments the background by flood-filling from the image border every
/// pixel close to the border's median colour.
///
/// Works for the plain studio backdrops identity photos are taken
/// against; textured scenes leave most of the frame as subject.
#[derive(Debug, Clone, Copy)]
pub struct BorderColorSegmenter {
    /// Maximum Euclidean RGB distance from the backdrop colour.
    pub tolerance: f32,
}

impl Default for BorderColorSegmenter {
    fn default() -> Self {
        Self { tolerance: 30.0 }
    }
}

impl BorderColorSegmenter {
    /// Creates a segmenter with the given colour tolerance.
    #[must_use]
    pub const fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

fn border_pixels(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let horizontal = (0..width).flat_map(move |x| [(x, 0), (x, height - 1)]);
    let vertical = (1..height.saturating_sub(1)).flat_map(move |y| [(0, y), (width - 1, y)]);
    horizontal.chain(vertical)
}

/// Per-channel median of the border pixels.
fn backdrop_colour(rgb: &RgbImage) -> [f32; 3] {
    let (w, h) = rgb.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();
    for (x, y) in border_pixels(w, h) {
        let pixel = rgb.get_pixel(x, y).0;
        for (c, values) in channels.iter_mut().enumerate() {
            values.push(pixel[c]);
        }
    }
    channels.map(|mut values| {
        values.sort_unstable();
        values.get(values.len() / 2).copied().map_or(0.0, f32::from)
    })
}

fn distance(pixel: [u8; 3], colour: [f32; 3]) -> f32 {
    pixel
        .iter()
        .zip(colour)
        .map(|(p, c)| (f32::from(*p) - c).powi(2))
        .sum::<f32>()
        .sqrt()
}

impl BackgroundSegmenter for BorderColorSegmenter {
    fn segment_background(&self, image: &ImageInfo) -> Result<BackgroundMask> {
        let (w, h) = (image.width, image.height);
        if w < 2 || h < 2 {
            bail!("{} is too small to segment ({w}x{h})", image.path);
        }
        let rgb = image.to_rgb8();
        let backdrop = backdrop_colour(&rgb);
        let matches = |x: u32, y: u32| distance(rgb.get_pixel(x, y).0, backdrop) <= self.tolerance;

        let idx = |x: u32, y: u32| y as usize * w as usize + x as usize;
        let mut visited = vec![false; w as usize * h as usize];
        let mut queue = VecDeque::new();
        for (x, y) in border_pixels(w, h) {
            if !visited[idx(x, y)] && matches(x, y) {
                visited[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
        while let Some((x, y)) = queue.pop_front() {
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx < w && ny < h && !visited[idx(nx, ny)] && matches(nx, ny) {
                    visited[idx(nx, ny)] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        let mask = BackgroundMask::from_fn(w, h, |x, y| visited[idx(x, y)]);
        debug!(
            "{}: backdrop {:?}, {:.0}% background",
            image.path,
            backdrop.map(f32::round),
            mask.coverage() * 100.0
        );
        Ok(mask)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};

    fn framed_square() -> ImageInfo {
        let img = RgbImage::from_fn(40, 50, |x, y| {
            if (10..30).contains(&x) && (10..40).contains(&y) {
                Rgb([190, 150, 130])
            } else {
                Rgb([250, 250, 250])
            }
        });
        ImageInfo::new("square.png", DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_subject_is_not_background() {
        let mask = BorderColorSegmenter::default()
            .segment_background(&framed_square())
            .unwrap();
        assert!(mask.is_background(0, 0));
        assert!(mask.is_background(5, 45));
        assert!(!mask.is_background(20, 20));
        assert_eq!(mask.width(), 40);
    }

    #[test]
    fn test_enclosed_backdrop_colour_is_subject() {
        // a backdrop-coloured hole inside the subject is not reachable
        let mut img = framed_square().to_rgb8();
        for y in 18..22 {
            for x in 18..22 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let info = ImageInfo::new("hole.png", DynamicImage::ImageRgb8(img));
        let mask = BorderColorSegmenter::default().segment_background(&info).unwrap();
        assert!(!mask.is_background(20, 20));
    }

    #[test]
    fn test_tiny_image_is_rejected() {
        let info = ImageInfo::new("dot.png", DynamicImage::new_rgb8(1, 1));
        assert!(BorderColorSegmenter::default().segment_background(&info).is_err());
    }
}
