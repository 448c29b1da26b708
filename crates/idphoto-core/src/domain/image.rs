//! Image and geometry primitives shared across the pipeline.

use serde::{Deserialize, Serialize};

/// Basic image information extracted during loading.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Path or synthetic identifier of the image.
    pub path: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Decoded image data.
    pub image: image::DynamicImage,
}

impl ImageInfo {
    /// Wraps a decoded image, reading its dimensions.
    #[must_use]
    pub fn new(path: impl Into<String>, image: image::DynamicImage) -> Self {
        Self {
            path: path.into(),
            width: image.width(),
            height: image.height(),
            image,
        }
    }

    /// Wraps an RGB buffer under the same path as `self`.
    #[must_use]
    pub fn with_rgb(&self, rgb: image::RgbImage) -> Self {
        Self::new(self.path.clone(), image::DynamicImage::ImageRgb8(rgb))
    }

    /// Converts to an 8-bit RGB buffer.
    #[must_use]
    pub fn to_rgb8(&self) -> image::RgbImage {
        self.image.to_rgb8()
    }

    /// Converts to an 8-bit luminance buffer.
    #[must_use]
    pub fn to_luma8(&self) -> image::GrayImage {
        self.image.to_luma8()
    }

    /// Returns the image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.width, self.height)
    }

    /// Whether the image has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageDimensions {
    /// Creates new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
impl BoundingBox {
    /// Creates a new bounding box.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square box of side `size` centred on `(cx, cy)`, clipped to the image.
    #[must_use]
    pub fn centered(cx: f32, cy: f32, size: f32, image_width: u32, image_height: u32) -> Self {
        let half = size / 2.0;
        let x0 = (cx - half).max(0.0) as u32;
        let y0 = (cy - half).max(0.0) as u32;
        let x1 = ((cx + half).max(0.0) as u32).min(image_width);
        let y1 = ((cy + half).max(0.0) as u32).min(image_height);
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Area in pixels.
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Whether the pixel `(x, y)` lies inside the box.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Grows the box by `ratio` of its size on every side, clipped to the image.
    #[must_use]
    pub fn expand(&self, ratio: f32, image_width: u32, image_height: u32) -> Self {
        let dx = (self.width as f32 * ratio) as u32;
        let dy = (self.height as f32 * ratio) as u32;
        let x0 = self.x.saturating_sub(dx);
        let y0 = self.y.saturating_sub(dy);
        let x1 = self.right().saturating_add(dx).min(image_width);
        let y1 = self.bottom().saturating_add(dy).min(image_height);
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Clips the box to the image bounds.
    #[must_use]
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let x0 = self.x.min(image_width);
        let y0 = self.y.min(image_height);
        let x1 = self.right().min(image_width);
        let y1 = self.bottom().min(image_height);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Scales coordinates by `factor` (used after downscaling an image).
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            (self.x as f32 * factor) as u32,
            (self.y as f32 * factor) as u32,
            (self.width as f32 * factor) as u32,
            (self.height as f32 * factor) as u32,
        )
    }

    /// Iterates the pixel coordinates covered by the box.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Midpoint between two points.
    #[must_use]
    pub fn midpoint(&self, other: &Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Scales coordinates by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// Binary background mask produced by a segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundMask {
    width: u32,
    height: u32,
    background: Vec<bool>,
}

impl BackgroundMask {
    /// Builds a mask by evaluating `is_background` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut is_background: impl FnMut(u32, u32) -> bool) -> Self {
        let mut background = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                background.push(is_background(x, y));
            }
        }
        Self {
            width,
            height,
            background,
        }
    }

    /// Mask treating everything outside `subject` as background.
    #[must_use]
    pub fn outside(subject: &BoundingBox, width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |x, y| !subject.contains(x, y))
    }

    /// Mask width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether `(x, y)` is background. Out-of-range pixels are not.
    #[must_use]
    pub fn is_background(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.background[y as usize * self.width as usize + x as usize]
    }

    /// Whether `(x, y)` and its 8 neighbours are all background.
    #[must_use]
    pub fn is_interior_background(&self, x: u32, y: u32) -> bool {
        if x == 0 || y == 0 || x + 1 >= self.width || y + 1 >= self.height {
            return false;
        }
        (y - 1..=y + 1).all(|ny| (x - 1..=x + 1).all(|nx| self.is_background(nx, ny)))
    }

    /// Fraction of pixels marked as background.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.background.is_empty() {
            return 0.0;
        }
        self.background.iter().filter(|b| **b).count() as f64 / self.background.len() as f64
    }

    /// Whether the mask matches the given dimensions.
    #[must_use]
    pub const fn fits(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
