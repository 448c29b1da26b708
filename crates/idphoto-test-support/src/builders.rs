//! Synthetic image builders for testing.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use idphoto_core::domain::{
    BoundingBox, FaceDetection, FaceFeatures, FaceOrientation, FeatureVisibility, ImageInfo, Point,
};

use crate::mocks::MockFaceDetector;

/// Builder for flat test images used by the quality tests.
pub struct SyntheticImageBuilder;

impl SyntheticImageBuilder {
    /// Creates a high-contrast checkerboard pattern (very sharp edges).
    #[must_use]
    pub fn checkerboard(width: u32, height: u32, cell_size: u32) -> ImageInfo {
        let cell = cell_size.max(1);
        let img = GrayImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        ImageInfo::new("synthetic://checkerboard", DynamicImage::ImageLuma8(img))
    }

    /// Creates a uniform gray image (no edges, simulates severe blur).
    #[must_use]
    pub fn uniform_gray(width: u32, height: u32, value: u8) -> ImageInfo {
        let img = GrayImage::from_fn(width, height, |_, _| Luma([value]));
        ImageInfo::new("synthetic://uniform_gray", DynamicImage::ImageLuma8(img))
    }

    /// Creates a uniform RGB image.
    #[must_use]
    pub fn rgb_uniform(width: u32, height: u32, rgb: [u8; 3]) -> ImageInfo {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb(rgb));
        ImageInfo::new("synthetic://rgb_uniform", DynamicImage::ImageRgb8(img))
    }

    /// Creates an image with pseudo-random speckle of the given amplitude
    /// around mid gray.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn speckled(width: u32, height: u32, amplitude: u8) -> ImageInfo {
        let mut state: u32 = 0x9e37_79b9;
        let img = GrayImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let offset = (state % (2 * u32::from(amplitude) + 1)) as i32 - i32::from(amplitude);
            Luma([(128 + offset).clamp(0, 255) as u8])
        });
        ImageInfo::new("synthetic://speckled", DynamicImage::ImageLuma8(img))
    }
}

/// Lens style drawn over the eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lenses {
    /// Clear lenses; pixels are left as skin.
    Clear,
    /// Dark tinted lenses.
    Tinted,
}

/// Builder for a synthetic head-and-shoulders portrait plus the detector
/// output describing it.
///
/// The default is a compliant ICAO portrait: 300x400, white background,
/// a textured skin-tone face centred horizontally with its eye line at
/// 40% of the image height, neutral expression and frontal pose.
#[derive(Debug, Clone)]
pub struct SyntheticPortraitBuilder {
    path: String,
    width: u32,
    height: u32,
    background: [u8; 3],
    face: BoundingBox,
    skin: [[u8; 3]; 2],
    shadow: Option<f32>,
    lenses: Option<Lenses>,
    confidence: f32,
    mouth_openness: f32,
    smile_score: f32,
    eye_openness: (f32, f32),
    orientation: FaceOrientation,
    head_covering: bool,
    visibility: FeatureVisibility,
}

impl Default for SyntheticPortraitBuilder {
    fn default() -> Self {
        Self::compliant()
    }
}

impl SyntheticPortraitBuilder {
    /// Compliant ICAO portrait.
    #[must_use]
    pub fn compliant() -> Self {
        Self {
            path: "synthetic://portrait".to_string(),
            width: 300,
            height: 400,
            background: [255, 255, 255],
            face: BoundingBox::new(75, 70, 150, 220),
            skin: [[205, 165, 145], [185, 148, 130]],
            shadow: None,
            lenses: None,
            confidence: 0.95,
            mouth_openness: 0.05,
            smile_score: 0.0,
            eye_openness: (0.9, 0.9),
            orientation: FaceOrientation::default(),
            head_covering: false,
            visibility: FeatureVisibility::default(),
        }
    }

    /// Sets the image path, which also keys the mock detector.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the image size, scaling the face box with it.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        self.face = BoundingBox::new(
            (self.face.x as f32 * sx) as u32,
            (self.face.y as f32 * sy) as u32,
            (self.face.width as f32 * sx) as u32,
            (self.face.height as f32 * sy) as u32,
        );
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the background colour.
    #[must_use]
    pub const fn background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    /// Replaces the face box.
    #[must_use]
    pub const fn face_box(mut self, face: BoundingBox) -> Self {
        self.face = face;
        self
    }

    /// Moves the face horizontally by `dx` pixels (positive is right).
    #[must_use]
    pub fn shifted(mut self, dx: i32) -> Self {
        let x = i64::from(self.face.x) + i64::from(dx);
        self.face.x = u32::try_from(x.max(0)).unwrap_or(0);
        self
    }

    /// Darkens the left half of the face by `factor` (0.0 to 1.0).
    #[must_use]
    pub const fn shadowed_left(mut self, factor: f32) -> Self {
        self.shadow = Some(factor);
        self
    }

    /// Draws glasses and reports them as detected.
    #[must_use]
    pub const fn glasses(mut self, lenses: Lenses) -> Self {
        self.lenses = Some(lenses);
        self
    }

    /// Sets the detection confidence.
    #[must_use]
    pub const fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets mouth openness.
    #[must_use]
    pub const fn mouth_openness(mut self, openness: f32) -> Self {
        self.mouth_openness = openness;
        self
    }

    /// Sets smile intensity.
    #[must_use]
    pub const fn smile(mut self, score: f32) -> Self {
        self.smile_score = score;
        self
    }

    /// Sets left and right eye openness.
    #[must_use]
    pub const fn eye_openness(mut self, left: f32, right: f32) -> Self {
        self.eye_openness = (left, right);
        self
    }

    /// Sets head pose in degrees.
    #[must_use]
    pub const fn orientation(mut self, yaw: f32, pitch: f32, roll: f32) -> Self {
        self.orientation = FaceOrientation { yaw, pitch, roll };
        self
    }

    /// Reports a head covering leaving the given features visible.
    #[must_use]
    pub const fn head_covering(mut self, visibility: FeatureVisibility) -> Self {
        self.head_covering = true;
        self.visibility = visibility;
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn eyes(&self) -> (Point, Point) {
        let f = &self.face;
        let y = f.y as f32 + 0.4 * f.height as f32;
        (
            Point::new(f.x as f32 + 0.3 * f.width as f32, y),
            Point::new(f.x as f32 + 0.7 * f.width as f32, y),
        )
    }

    /// Detector output for the drawn face.
    #[must_use]
    pub const fn detection(&self) -> FaceDetection {
        FaceDetection {
            bbox: self.face,
            confidence: self.confidence,
        }
    }

    /// Feature extractor output for the drawn face.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn features(&self) -> FaceFeatures {
        let f = &self.face;
        FaceFeatures {
            glasses_detected: self.lenses.is_some(),
            head_covering_detected: self.head_covering,
            eye_positions: self.eyes(),
            mouth_position: Point::new(
                f.x as f32 + 0.5 * f.width as f32,
                f.y as f32 + 0.78 * f.height as f32,
            ),
            mouth_openness: self.mouth_openness,
            smile_score: self.smile_score,
            eye_openness: self.eye_openness,
            face_orientation: self.orientation,
            feature_visibility: self.visibility,
        }
    }

    /// Renders the portrait.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn build(&self) -> ImageInfo {
        let face = self.face;
        let mid = face.x + face.width / 2;
        let lens_side = face.width as f32 * 0.25;
        let (left, right) = self.eyes();
        let lenses = [
            BoundingBox::centered(left.x, left.y, lens_side, self.width, self.height),
            BoundingBox::centered(right.x, right.y, lens_side, self.width, self.height),
        ];

        let img = RgbImage::from_fn(self.width, self.height, |x, y| {
            if !face.contains(x, y) {
                return Rgb(self.background);
            }
            if self.lenses == Some(Lenses::Tinted) && lenses.iter().any(|l| l.contains(x, y)) {
                return Rgb([30, 40, 90]);
            }
            let mut pixel = self.skin[((x / 8 + y / 8) % 2) as usize];
            if let Some(factor) = self.shadow.filter(|_| x < mid) {
                pixel = pixel.map(|c| (f32::from(c) * factor).round().clamp(0.0, 255.0) as u8);
            }
            Rgb(pixel)
        });
        ImageInfo::new(self.path.clone(), DynamicImage::ImageRgb8(img))
    }

    /// Mock detector that reports this portrait's face for its path.
    #[must_use]
    pub fn detector(&self) -> MockFaceDetector {
        MockFaceDetector::new().with_face(&self.path, self.width, self.detection(), self.features())
    }
}
