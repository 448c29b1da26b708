//! Mock implementations of core port traits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use idphoto_core::domain::{
    BackgroundMask, BoundingBox, CorrectionKind, CorrectionParameters, FaceDetection, FaceFeatures,
    ImageInfo, ImageInput, ProcessingProgress, ProcessingResult, ProcessingStage,
};
use idphoto_core::error::PipelineError;
use idphoto_core::ports::{
    BackgroundSegmenter, CorrectionPrimitive, FaceDetector, ImageLoader, ImageSource,
    ProgressSink, ResultOutput,
};
use image::RgbImage;

#[allow(clippy::cast_precision_loss)]
fn scale_for(image: &ImageInfo, reference_width: u32) -> f32 {
    if reference_width == 0 {
        1.0
    } else {
        image.width as f32 / reference_width as f32
    }
}

/// Mock implementation of `ImageSource` for testing.
pub struct MockImageSource {
    inputs: Vec<ImageInput>,
    iteration_count: AtomicUsize,
}

impl MockImageSource {
    /// Creates a new mock source with the given inputs.
    #[must_use]
    pub fn new(inputs: Vec<ImageInput>) -> Self {
        Self {
            inputs,
            iteration_count: AtomicUsize::new(0),
        }
    }

    /// Creates an empty mock source.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Returns the number of times the source has been iterated.
    #[must_use]
    pub fn iteration_count(&self) -> usize {
        self.iteration_count.load(Ordering::SeqCst)
    }
}

impl ImageSource for MockImageSource {
    fn inputs(&self) -> Box<dyn Iterator<Item = ImageInput> + Send + '_> {
        self.iteration_count.fetch_add(1, Ordering::SeqCst);
        Box::new(self.inputs.iter().cloned())
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.inputs.len())
    }
}

/// In-memory `ImageLoader`.
///
/// Unknown paths fail with `NotFound`. A number of transient I/O failures
/// can be queued to exercise the retry path.
#[derive(Default)]
pub struct MockImageLoader {
    images: HashMap<PathBuf, ImageInfo>,
    transient_failures: AtomicUsize,
    loads: AtomicUsize,
}

impl MockImageLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `image` for its own path.
    #[must_use]
    pub fn with_image(mut self, image: ImageInfo) -> Self {
        self.images.insert(PathBuf::from(&image.path), image);
        self
    }

    /// Fails the next `n` loads with a transient I/O error.
    #[must_use]
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of `load` calls so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ImageLoader for MockImageLoader {
    fn load(&self, path: &Path) -> anyhow::Result<ImageInfo> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "device busy").into());
        }
        self.images.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
            .into()
        })
    }
}

#[derive(Clone)]
struct KnownFace {
    reference_width: u32,
    detection: FaceDetection,
    features: FaceFeatures,
}

/// Mock `FaceDetector` keyed by image path.
///
/// Faces are registered in the coordinates of an image of a reference
/// width and rescaled to the width of the image being analysed, so
/// downscaled or corrected copies of a registered image still resolve.
#[derive(Default)]
pub struct MockFaceDetector {
    faces: HashMap<String, KnownFace>,
    empty_results: AtomicUsize,
    error: Option<PipelineError>,
    errors_remaining: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFaceDetector {
    /// Creates a detector that finds no faces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a face for `path`.
    #[must_use]
    pub fn with_face(
        mut self,
        path: &str,
        reference_width: u32,
        detection: FaceDetection,
        features: FaceFeatures,
    ) -> Self {
        self.faces.insert(
            path.to_string(),
            KnownFace {
                reference_width,
                detection,
                features,
            },
        );
        self
    }

    /// Returns no faces for the first `n` detection calls.
    #[must_use]
    pub fn miss_first(self, n: usize) -> Self {
        self.empty_results.store(n, Ordering::SeqCst);
        self
    }

    /// Fails every detection call with `err`.
    #[must_use]
    pub fn failing(self, err: PipelineError) -> Self {
        self.failing_times(err, usize::MAX)
    }

    /// Fails the first `n` detection calls with `err`.
    #[must_use]
    pub fn failing_times(mut self, err: PipelineError, n: usize) -> Self {
        self.error = Some(err);
        self.errors_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Sleeps for `delay` before each detection call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `detect_faces` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceDetector for MockFaceDetector {
    fn detect_faces(&self, image: &ImageInfo) -> anyhow::Result<Vec<FaceDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(err) = &self.error {
            let remaining = self.errors_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.errors_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(err.clone().into());
            }
        }
        let pending = self.empty_results.load(Ordering::SeqCst);
        if pending > 0 {
            self.empty_results.store(pending - 1, Ordering::SeqCst);
            return Ok(vec![]);
        }
        Ok(self
            .faces
            .get(&image.path)
            .map(|face| {
                let scale = scale_for(image, face.reference_width);
                vec![FaceDetection {
                    bbox: face
                        .detection
                        .bbox
                        .scaled(scale)
                        .clamp_to(image.width, image.height),
                    confidence: face.detection.confidence,
                }]
            })
            .unwrap_or_default())
    }

    fn extract_face_features(
        &self,
        image: &ImageInfo,
        _bbox: &BoundingBox,
    ) -> anyhow::Result<FaceFeatures> {
        let face = self
            .faces
            .get(&image.path)
            .ok_or_else(|| anyhow::anyhow!("no landmarks for {}", image.path))?;
        Ok(face.features.scaled(scale_for(image, face.reference_width)))
    }
}

/// Mock `BackgroundSegmenter` that marks everything outside a subject box.
pub struct MockSegmenter {
    subject: Option<(BoundingBox, u32)>,
}

impl MockSegmenter {
    /// Segments everything outside `subject`, given in the coordinates of
    /// an image `reference_width` pixels wide.
    #[must_use]
    pub const fn outside(subject: BoundingBox, reference_width: u32) -> Self {
        Self {
            subject: Some((subject, reference_width)),
        }
    }

    /// A segmenter whose every call fails.
    #[must_use]
    pub const fn failing() -> Self {
        Self { subject: None }
    }
}

impl BackgroundSegmenter for MockSegmenter {
    fn segment_background(&self, image: &ImageInfo) -> anyhow::Result<BackgroundMask> {
        let (subject, reference_width) = self
            .subject
            .ok_or_else(|| anyhow::anyhow!("segmentation model unavailable"))?;
        let subject = subject.scaled(scale_for(image, reference_width));
        Ok(BackgroundMask::outside(&subject, image.width, image.height))
    }
}

type CorrectionFn = dyn Fn(&RgbImage, &CorrectionParameters) -> RgbImage + Send + Sync;

/// Mock `CorrectionPrimitive` backed by a closure.
pub struct MockCorrection {
    kind: CorrectionKind,
    apply: Option<Box<CorrectionFn>>,
    calls: AtomicUsize,
}

impl MockCorrection {
    /// A correction of `kind` computed by `apply`.
    #[must_use]
    pub fn new(
        kind: CorrectionKind,
        apply: impl Fn(&RgbImage, &CorrectionParameters) -> RgbImage + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            apply: Some(Box::new(apply)),
            calls: AtomicUsize::new(0),
        }
    }

    /// A correction that returns its input unchanged.
    #[must_use]
    pub fn identity(kind: CorrectionKind) -> Self {
        Self::new(kind, |image, _| image.clone())
    }

    /// A correction whose every call fails.
    #[must_use]
    pub const fn failing(kind: CorrectionKind) -> Self {
        Self {
            kind,
            apply: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `apply` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CorrectionPrimitive for MockCorrection {
    fn kind(&self) -> CorrectionKind {
        self.kind
    }

    fn apply(&self, image: &RgbImage, params: &CorrectionParameters) -> anyhow::Result<RgbImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let apply = self
            .apply
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{} is not available", self.kind))?;
        Ok(apply(image, params))
    }
}

/// Mock implementation of `ResultOutput` for testing.
///
/// Captures results for later assertions.
#[derive(Default)]
pub struct MockResultOutput {
    results: Mutex<Vec<ProcessingResult>>,
    flush_count: AtomicUsize,
}

impl MockResultOutput {
    /// Creates a new mock output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured results.
    #[must_use]
    pub fn results(&self) -> Vec<ProcessingResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of times `flush()` was called.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }
}

impl ResultOutput for MockResultOutput {
    fn write(&self, result: &ProcessingResult) -> anyhow::Result<()> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock implementation of `ProgressSink` for testing.
///
/// Captures `(session_id, progress)` pairs in arrival order. Cloning
/// shares the same event log.
#[derive(Clone, Default)]
pub struct MockProgressSink {
    events: Arc<Mutex<Vec<(String, ProcessingProgress)>>>,
}

impl MockProgressSink {
    /// Creates a new mock progress sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, ProcessingProgress)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages reported for one session, in order.
    #[must_use]
    pub fn stages_for(&self, session_id: &str) -> Vec<ProcessingStage> {
        self.events()
            .into_iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, progress)| progress.stage)
            .collect()
    }

    /// Distinct session ids seen, in first-seen order.
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (id, _) in self.events() {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }
}

impl ProgressSink for MockProgressSink {
    fn on_progress(&self, session_id: &str, progress: &ProcessingProgress) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id.to_string(), progress.clone()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SyntheticPortraitBuilder;

    #[test]
    fn test_mock_image_source_empty() {
        let source = MockImageSource::empty();
        assert_eq!(source.count_hint(), Some(0));
        assert_eq!(source.inputs().count(), 0);
        assert_eq!(source.iteration_count(), 1);
    }

    #[test]
    fn test_mock_loader_missing_and_transient() {
        let portrait = SyntheticPortraitBuilder::compliant().path("a.png").build();
        let loader = MockImageLoader::new()
            .with_image(portrait)
            .with_transient_failures(1);

        let first = loader.load(Path::new("a.png")).unwrap_err();
        assert_eq!(
            first.downcast_ref::<std::io::Error>().map(std::io::Error::kind),
            Some(std::io::ErrorKind::Interrupted)
        );
        assert_eq!(loader.load(Path::new("a.png")).unwrap().width, 300);

        let missing = loader.load(Path::new("b.png")).unwrap_err();
        assert_eq!(
            missing.downcast_ref::<std::io::Error>().map(std::io::Error::kind),
            Some(std::io::ErrorKind::NotFound)
        );
        assert_eq!(loader.loads(), 3);
    }

    #[test]
    fn test_mock_detector_rescales_to_image_width() {
        let builder = SyntheticPortraitBuilder::compliant().path("p.png");
        let detector = builder.detector();
        let full = builder.build();
        let half = builder.clone().size(150, 200).path("p.png").build();

        let faces = detector.detect_faces(&full).unwrap();
        assert_eq!(faces[0].bbox, builder.detection().bbox);

        let faces = detector.detect_faces(&half).unwrap();
        assert_eq!(faces[0].bbox.width, builder.detection().bbox.width / 2);
        let features = detector.extract_face_features(&half, &faces[0].bbox).unwrap();
        assert!((features.eye_positions.0.y - 79.0).abs() < 0.5);
    }

    #[test]
    fn test_mock_detector_misses_then_finds() {
        let builder = SyntheticPortraitBuilder::compliant();
        let detector = builder.detector().miss_first(2);
        let image = builder.build();
        assert!(detector.detect_faces(&image).unwrap().is_empty());
        assert!(detector.detect_faces(&image).unwrap().is_empty());
        assert_eq!(detector.detect_faces(&image).unwrap().len(), 1);
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn test_mock_correction_failing() {
        let correction = MockCorrection::failing(CorrectionKind::LightingCorrection);
        let image = RgbImage::new(2, 2);
        assert!(correction
            .apply(&image, &CorrectionParameters::default())
            .is_err());
        assert_eq!(correction.calls(), 1);
    }

    #[test]
    fn test_mock_progress_sink() {
        let sink = MockProgressSink::new();
        sink.on_progress("s-1", &ProcessingProgress::entering(ProcessingStage::ImageLoading));
        sink.on_progress("s-2", &ProcessingProgress::entering(ProcessingStage::ImageLoading));
        sink.on_progress("s-1", &ProcessingProgress::entering(ProcessingStage::FaceDetection));

        assert_eq!(
            sink.stages_for("s-1"),
            vec![ProcessingStage::ImageLoading, ProcessingStage::FaceDetection]
        );
        assert_eq!(sink.sessions(), vec!["s-1".to_string(), "s-2".to_string()]);
    }

    #[test]
    fn test_mock_result_output_flush() {
        let output = MockResultOutput::new();
        output.flush().unwrap();
        assert!(output.results().is_empty());
        assert_eq!(output.flush_count(), 1);
    }
}
