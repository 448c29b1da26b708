//! Per-image stage machine, batch fan-out and session bookkeeping.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::{fingerprint, ResultCache};
use super::metrics::{MetricsCollector, ProcessingMetrics};
use super::recovery::{recovery_kind, ErrorHandler, RecoveryAction};
use super::session::{ProcessingSession, SessionSnapshot};
use crate::autofix::{AutoFixConfig, AutoFixEngine, ImprovementPolicy, ProbeResult};
use crate::domain::{
    AutoFixResult, BackgroundMask, BoundingBox, ComplianceReport, CorrectionParameters,
    FaceDetection, FaceFeatures, ImageInfo, ImageInput, ProcessingProgress, ProcessingResult,
    ProcessingStage, QualityMetrics, ValidationResult,
};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::imaging;
use crate::ports::{
    BackgroundSegmenter, CorrectionPrimitive, FaceDetector, ImageLoader, ProgressSink,
};
use crate::quality::{QualityConfig, QualityEngine};
use crate::rules::{horizontal_offset, FaceEvidence, RuleParameters, RulesEngine, ValidationEvidence};

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Batch worker threads.
    pub workers: usize,
    /// Time budget for detector, segmenter and auto-fix calls.
    pub stage_timeout_ms: Option<u64>,
    /// Whether validation results are cached by image fingerprint.
    pub cache_enabled: bool,
    /// Maximum cached validations.
    pub cache_capacity: usize,
    /// Detections below this confidence are ignored.
    pub min_face_confidence: f32,
    /// Mean rule confidence below which a report is inconsistent.
    pub consistency_floor: f64,
    /// Overrides the format's pass threshold.
    pub pass_threshold: Option<f64>,
    /// Quality engine settings.
    pub quality: QualityConfig,
    /// Auto-fix settings.
    pub autofix: AutoFixConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stage_timeout_ms: Some(30_000),
            cache_enabled: true,
            cache_capacity: 256,
            min_face_confidence: 0.5,
            consistency_floor: 0.6,
            pass_threshold: None,
            quality: QualityConfig::default(),
            autofix: AutoFixConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Checks value ranges, including the nested configurations.
    ///
    /// # Errors
    ///
    /// Returns an error message describing the first invalid value.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.stage_timeout_ms == Some(0) {
            return Err("stage timeout must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_face_confidence) {
            return Err(format!(
                "minimum face confidence must be 0.0-1.0, got {}",
                self.min_face_confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.consistency_floor) {
            return Err(format!(
                "consistency floor must be 0.0-1.0, got {}",
                self.consistency_floor
            ));
        }
        if let Some(threshold) = self.pass_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(format!("pass threshold must be 0-100, got {threshold}"));
            }
        }
        self.quality.validate()?;
        self.autofix.validate()
    }
}

/// Per-call processing options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Run auto-fix after validation.
    pub auto_fix: bool,
}

/// Aggregate outcome of a batch, results in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Inputs processed.
    pub total: usize,
    /// Inputs that succeeded.
    pub successful: usize,
    /// Inputs that failed.
    pub failed: usize,
    /// Per-input results.
    pub results: Vec<ProcessingResult>,
    /// Recorded errors by kind across the batch.
    pub error_summary: BTreeMap<ErrorKind, usize>,
    /// Mean processing time per input.
    pub average_processing_ms: f64,
}

impl BatchResult {
    /// Aggregates per-image results.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_results(results: Vec<ProcessingResult>) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let mut error_summary = BTreeMap::new();
        for err in results.iter().flat_map(|r| &r.errors) {
            *error_summary.entry(err.kind).or_insert(0) += 1;
        }
        let total_ms: u64 = results
            .iter()
            .map(|r| r.processing_metrics.processing_ms)
            .sum();
        let average_processing_ms = if total == 0 {
            0.0
        } else {
            total_ms as f64 / total as f64
        };
        Self {
            total,
            successful,
            failed: total - successful,
            results,
            error_summary,
            average_processing_ms,
        }
    }
}

/// Validation output shared through the cache.
#[derive(Debug, Clone)]
struct Validated {
    result: ValidationResult,
    probe: ProbeResult,
    hints: CorrectionParameters,
    detection_error: Option<PipelineError>,
    inconsistency: Option<PipelineError>,
    detector_confidence: Option<f32>,
    consistency: f64,
}

#[derive(Debug, Default)]
struct Outcome {
    validation: Option<ValidationResult>,
    auto_fix: Option<AutoFixResult>,
    cache_hit: bool,
    failure: Option<String>,
}

/// Builder for [`ProcessingController`].
pub struct ControllerBuilder {
    loader: Arc<dyn ImageLoader>,
    detector: Arc<dyn FaceDetector>,
    segmenter: Option<Arc<dyn BackgroundSegmenter>>,
    corrections: Vec<Arc<dyn CorrectionPrimitive>>,
    policy: Option<Arc<dyn ImprovementPolicy>>,
    handler: ErrorHandler,
    sinks: Vec<Arc<dyn ProgressSink>>,
    config: ControllerConfig,
}

impl ControllerBuilder {
    /// Sets the background segmenter. Without one, the background is
    /// everything outside the head and shoulders.
    #[must_use]
    pub fn segmenter(mut self, segmenter: Arc<dyn BackgroundSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Registers a correction primitive.
    #[must_use]
    pub fn correction(mut self, primitive: Arc<dyn CorrectionPrimitive>) -> Self {
        self.corrections.push(primitive);
        self
    }

    /// Registers several correction primitives.
    #[must_use]
    pub fn corrections(
        mut self,
        primitives: impl IntoIterator<Item = Arc<dyn CorrectionPrimitive>>,
    ) -> Self {
        self.corrections.extend(primitives);
        self
    }

    /// Replaces the auto-fix expected-improvement policy.
    #[must_use]
    pub fn improvement_policy(mut self, policy: Arc<dyn ImprovementPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Replaces the recovery policy.
    #[must_use]
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Registers a progress sink.
    #[must_use]
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or if the pool
    /// cannot be created.
    pub fn build(self) -> anyhow::Result<ProcessingController> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid controller configuration: {e}"))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("idphoto-worker-{i}"))
            .build()
            .context("failed to start worker pool")?;

        let mut autofix = AutoFixEngine::new(self.config.autofix.clone(), self.corrections);
        if let Some(policy) = self.policy {
            autofix = autofix.with_policy(policy);
        }
        let cache = self
            .config
            .cache_enabled
            .then(|| ResultCache::new(self.config.cache_capacity));

        Ok(ProcessingController {
            inner: Arc::new(Inner {
                quality: QualityEngine::new(self.config.quality.clone()),
                rules: RulesEngine::new(),
                autofix,
                loader: self.loader,
                detector: self.detector,
                segmenter: self.segmenter,
                handler: self.handler,
                metrics: MetricsCollector::new(),
                cache,
                sinks: RwLock::new(self.sinks),
                sessions: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(1),
                pool,
                config: self.config,
            }),
        })
    }
}

struct Inner {
    config: ControllerConfig,
    loader: Arc<dyn ImageLoader>,
    detector: Arc<dyn FaceDetector>,
    segmenter: Option<Arc<dyn BackgroundSegmenter>>,
    quality: QualityEngine,
    rules: RulesEngine,
    autofix: AutoFixEngine,
    handler: ErrorHandler,
    metrics: MetricsCollector,
    cache: Option<ResultCache<Validated>>,
    sinks: RwLock<Vec<Arc<dyn ProgressSink>>>,
    sessions: Mutex<HashMap<String, SessionSnapshot>>,
    next_session: AtomicU64,
    pool: rayon::ThreadPool,
}

/// Runs images through loading, detection, analysis, validation and
/// optional auto-fix.
///
/// Cheap to clone; clones share engines, cache, metrics and the worker
/// pool. Each `process_image` call owns its own session, so concurrent
/// calls never share mutable state.
#[derive(Clone)]
pub struct ProcessingController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProcessingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingController")
            .field("config", &self.inner.config)
            .field("segmenter", &self.inner.segmenter.is_some())
            .field("autofix", &self.inner.autofix)
            .finish_non_exhaustive()
    }
}

impl ProcessingController {
    /// Starts building a controller around the required ports.
    #[must_use]
    pub fn builder(loader: Arc<dyn ImageLoader>, detector: Arc<dyn FaceDetector>) -> ControllerBuilder {
        ControllerBuilder {
            loader,
            detector,
            segmenter: None,
            corrections: Vec::new(),
            policy: None,
            handler: ErrorHandler::default(),
            sinks: Vec::new(),
            config: ControllerConfig::default(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Adds a progress sink. Sessions already running see it from their
    /// next transition.
    pub fn register_progress(&self, sink: Arc<dyn ProgressSink>) {
        self.inner
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Processes one image against `format`.
    ///
    /// Never panics or returns early: failures are reported through
    /// `success`, `error_message` and `errors`.
    pub fn process_image(
        &self,
        input: impl Into<ImageInput>,
        format: &str,
        options: &ProcessingOptions,
    ) -> ProcessingResult {
        let input = input.into();
        let mut session = ProcessingSession::new(self.inner.next_session_id(), input.label());
        info!("[{}] processing {} as {format}", session.id(), session.path());
        self.inner.track(&session);
        self.inner.emit(
            session.id(),
            &ProcessingProgress::entering(ProcessingStage::ImageLoading),
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.inner.drive(&mut session, input, format, options)
        }))
        .unwrap_or_else(|payload| {
            let err = PipelineError::Stage {
                stage: session.stage(),
                message: panic_message(payload.as_ref()),
            };
            session.record_error(&err);
            Err(err)
        });
        self.inner.finish(session, outcome)
    }

    /// Validates an already decoded image without auto-fix.
    ///
    /// An image without a detectable face yields the no-face report
    /// rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Input`] for an unknown format or an empty
    /// image, or the escalated error of a stage whose recovery was
    /// exhausted.
    pub fn validate_image(&self, image: &ImageInfo, format: &str) -> Result<ValidationResult> {
        let params = self.inner.parameters(format)?;
        if image.is_empty() {
            return Err(PipelineError::Input(format!("{} has no pixels", image.path)));
        }
        let mut session = ProcessingSession::new(self.inner.next_session_id(), image.path.clone());
        let (validated, _) = self.inner.validated(&mut session, image, &params);
        validated.map(|v| v.result)
    }

    /// Processes `inputs` on the worker pool.
    ///
    /// Results keep input order. A failing input never affects the others.
    pub fn batch_process(
        &self,
        inputs: Vec<ImageInput>,
        format: &str,
        options: &ProcessingOptions,
    ) -> BatchResult {
        let count = inputs.len();
        let results: Vec<ProcessingResult> = self.inner.pool.install(|| {
            inputs
                .into_par_iter()
                .map(|input| self.process_image(input, format, options))
                .collect()
        });
        let batch = BatchResult::from_results(results);
        info!(
            "batch of {count}: {} ok, {} failed, avg {:.0} ms",
            batch.successful, batch.failed, batch.average_processing_ms
        );
        batch
    }

    /// Snapshot of aggregate metrics.
    #[must_use]
    pub fn get_processing_metrics(&self) -> ProcessingMetrics {
        let active = self.inner.sessions().len();
        self.inner.metrics.snapshot(active)
    }

    /// Snapshots of sessions currently in flight, ordered by id.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self.inner.sessions().values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }

    /// Drops all cached validations.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(|| "stage panicked".to_string(), |m| format!("stage panicked: {m}"))
}

#[allow(clippy::cast_precision_loss)]
fn mean_confidence(report: &ComplianceReport) -> f64 {
    if report.rule_results.is_empty() {
        return 0.0;
    }
    report
        .rule_results
        .iter()
        .map(|r| f64::from(r.confidence))
        .sum::<f64>()
        / report.rule_results.len() as f64
}

fn evidence<'a>(
    image: &ImageInfo,
    quality: &'a QualityMetrics,
    face: Option<&'a FaceEvidence>,
    face_count: usize,
    mask: Option<&'a BackgroundMask>,
) -> ValidationEvidence<'a> {
    let evidence = ValidationEvidence::new(image, quality).with_mask(mask);
    match face {
        Some(face) => evidence.with_face(face, face_count),
        None => evidence,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn correction_hints(
    params: &RuleParameters,
    face: Option<&FaceEvidence>,
    offset: Option<f64>,
    width: u32,
) -> CorrectionParameters {
    CorrectionParameters {
        background_color: params.style.background_color,
        roll_degrees: face.map_or(0.0, |f| f.features.face_orientation.roll),
        horizontal_shift: offset.map_or(0.0, |o| (-o * f64::from(width)) as f32),
        ..CorrectionParameters::default()
    }
}

#[allow(clippy::cast_precision_loss)]
fn scale_between(working: &ImageInfo, original: &ImageInfo) -> f32 {
    if original.width == 0 {
        1.0
    } else {
        working.width as f32 / original.width as f32
    }
}

impl Inner {
    fn next_session_id(&self) -> String {
        format!("session-{:06}", self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionSnapshot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, session: &ProcessingSession) {
        self.sessions()
            .insert(session.id().to_string(), session.snapshot());
    }

    fn emit(&self, session_id: &str, progress: &ProcessingProgress) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in sinks {
            sink.on_progress(session_id, progress);
        }
    }

    fn enter(&self, session: &mut ProcessingSession, stage: ProcessingStage) {
        let progress = session.enter(stage);
        self.track(session);
        self.emit(session.id(), &progress);
    }

    fn parameters(&self, format: &str) -> Result<RuleParameters> {
        let params = RuleParameters::for_format(format).map_err(PipelineError::Input)?;
        Ok(match self.config.pass_threshold {
            Some(threshold) => params.with_pass_threshold(threshold),
            None => params,
        })
    }

    fn degrades(&self, stage: ProcessingStage, err: &PipelineError) -> bool {
        self.handler
            .strategy(stage, err.kind())
            .is_some_and(|s| s.action == RecoveryAction::Degrade)
    }

    /// Runs `work` on its own thread when a stage timeout is configured.
    fn timed<T, F>(&self, stage: ProcessingStage, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let Some(timeout_ms) = self.config.stage_timeout_ms else {
            return work();
        };
        let (tx, rx) = mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name(format!("idphoto-{stage}"))
            .spawn(move || {
                let _ = tx.send(work());
            })
            .map_err(|e| PipelineError::Resource(format!("cannot start {stage} worker: {e}")))?;
        match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("{stage} exceeded {timeout_ms} ms");
                Err(PipelineError::Timeout { stage, timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Stage {
                stage,
                message: "stage worker panicked".to_string(),
            }),
        }
    }

    /// Runs `op` for the session's current stage, applying recovery
    /// strategies until it succeeds or the strategy is exhausted.
    ///
    /// `op` receives the working image and its scale relative to `image`.
    /// Exhaustion (or a degrade strategy) returns the first error.
    fn run_stage<T>(
        &self,
        session: &mut ProcessingSession,
        image: &ImageInfo,
        mut op: impl FnMut(&ImageInfo, f32) -> Result<T>,
    ) -> Result<T> {
        let stage = session.stage();
        let mut downscaled: Option<ImageInfo> = None;
        let mut enhancement: Option<u32> = None;
        let mut attempts: BTreeMap<ErrorKind, u32> = BTreeMap::new();
        let mut original: Option<PipelineError> = None;

        loop {
            let base = downscaled.as_ref().unwrap_or(image);
            let enhanced = enhancement.map(|attempt| imaging::enhance_contrast(base, attempt));
            let working = enhanced.as_ref().unwrap_or(base);

            let err = match op(working, scale_between(working, image)) {
                Ok(value) => {
                    if original.is_some() {
                        debug!("[{}] {stage} recovered", session.id());
                        session.mark_recovered();
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            session.record_error(&err);

            let count = attempts.entry(recovery_kind(err.kind())).or_insert(0);
            let action = self.handler.next_action(stage, &err, *count);
            *count += 1;
            let attempt = *count;
            let action = match action {
                Some(RecoveryAction::Degrade) | None => return Err(original.unwrap_or(err)),
                Some(action) => action,
            };
            session.note_recovery_attempt();
            debug!(
                "[{}] {stage}: {err}; recovering with {action:?} (attempt {attempt})",
                session.id()
            );
            original.get_or_insert(err);

            match action {
                RecoveryAction::EnhanceContrast => enhancement = Some(attempt),
                RecoveryAction::Downscale(factor) => {
                    let next = imaging::downscale(base, factor);
                    downscaled = Some(next);
                }
                RecoveryAction::Retry | RecoveryAction::Degrade => {}
            }
        }
    }

    fn load(&self, session: &mut ProcessingSession, path: &Path) -> Result<ImageInfo> {
        let stage = ProcessingStage::ImageLoading;
        let mut attempts = 0;
        let mut original: Option<PipelineError> = None;
        loop {
            match self.loader.load(path) {
                Ok(image) => {
                    if original.is_some() {
                        session.mark_recovered();
                    }
                    return Ok(image);
                }
                Err(e) => {
                    let err = PipelineError::from_port(stage, e);
                    session.record_error(&err);
                    if self.handler.next_action(stage, &err, attempts).is_none() {
                        return Err(original.unwrap_or(err));
                    }
                    attempts += 1;
                    session.note_recovery_attempt();
                    debug!("[{}] retrying load: {err}", session.id());
                    original.get_or_insert(err);
                }
            }
        }
    }

    /// Faces above the confidence floor, most confident first.
    fn detect(&self, image: &ImageInfo) -> Result<Vec<FaceDetection>> {
        let stage = ProcessingStage::FaceDetection;
        let detector = Arc::clone(&self.detector);
        let input = image.clone();
        let mut faces = self.timed(stage, move || {
            detector
                .detect_faces(&input)
                .map_err(|e| PipelineError::from_port(stage, e))
        })?;
        let floor = self.config.min_face_confidence;
        faces.retain(|f| f.confidence >= floor);
        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(faces)
    }

    fn extract_features(&self, image: &ImageInfo, bbox: BoundingBox) -> Result<FaceFeatures> {
        let stage = ProcessingStage::FaceAnalysis;
        let detector = Arc::clone(&self.detector);
        let input = image.clone();
        self.timed(stage, move || {
            detector
                .extract_face_features(&input, &bbox)
                .map_err(|e| PipelineError::from_port(stage, e))
        })
    }

    fn segment(&self, image: &ImageInfo) -> Result<Option<BackgroundMask>> {
        let Some(segmenter) = self.segmenter.as_ref().map(Arc::clone) else {
            return Ok(None);
        };
        let stage = ProcessingStage::BackgroundAnalysis;
        let input = image.clone();
        self.timed(stage, move || {
            segmenter
                .segment_background(&input)
                .map(Some)
                .map_err(|e| PipelineError::from_port(stage, e))
        })
    }

    /// Validation with caching when enabled. The flag reports a cache hit.
    fn validated(
        &self,
        session: &mut ProcessingSession,
        image: &ImageInfo,
        params: &RuleParameters,
    ) -> (Result<Validated>, bool) {
        let Some(cache) = &self.cache else {
            return (self.validate_stages(session, image, params), false);
        };
        let key = fingerprint(image, params.variation.name());
        let (value, hit) =
            cache.get_or_compute(key, || self.validate_stages(session, image, params));
        if !hit {
            return (value, false);
        }
        debug!("[{}] validation served from cache", session.id());
        (value.map(|cached| self.replay(session, cached)), true)
    }

    /// Walks a session through the validation stages of a cached result
    /// and rescores confidence against this session's own errors.
    fn replay(&self, session: &mut ProcessingSession, mut cached: Validated) -> Validated {
        for stage in [
            ProcessingStage::FaceDetection,
            ProcessingStage::FaceAnalysis,
            ProcessingStage::BackgroundAnalysis,
            ProcessingStage::QualityAssessment,
            ProcessingStage::IcaoValidation,
        ] {
            self.enter(session, stage);
        }
        for err in [&cached.detection_error, &cached.inconsistency]
            .into_iter()
            .flatten()
        {
            session.record_error(err);
        }
        let (confidence, requires_manual_review) = self.review(
            session,
            cached.detector_confidence,
            cached.consistency,
            cached.inconsistency.is_some(),
        );
        cached.result.confidence = confidence;
        cached.result.requires_manual_review = requires_manual_review;
        cached
    }

    /// Confidence and manual review flag for the session's current errors.
    fn review(
        &self,
        session: &mut ProcessingSession,
        detector_confidence: Option<f32>,
        consistency: f64,
        inconsistent: bool,
    ) -> (f64, bool) {
        let confidence = ErrorHandler::confidence_score(
            detector_confidence,
            consistency,
            session.errors().len(),
        );
        session.set_confidence(confidence);
        let requires_manual_review = inconsistent
            || detector_confidence.is_none()
            || self
                .handler
                .should_require_manual_review(confidence, session.errors());
        (confidence, requires_manual_review)
    }

    #[allow(clippy::too_many_lines)]
    fn validate_stages(
        &self,
        session: &mut ProcessingSession,
        image: &ImageInfo,
        params: &RuleParameters,
    ) -> Result<Validated> {
        let (w, h) = (image.width, image.height);

        self.enter(session, ProcessingStage::FaceDetection);
        let floor = self.config.min_face_confidence;
        let detection = self.run_stage(session, image, |working, scale| {
            let faces = self.detect(working)?;
            if faces.is_empty() {
                return Err(PipelineError::Detection(format!(
                    "no face with confidence >= {floor:.2}"
                )));
            }
            Ok(faces
                .into_iter()
                .map(|f| FaceDetection {
                    bbox: f.bbox.scaled(1.0 / scale),
                    confidence: f.confidence,
                })
                .collect::<Vec<_>>())
        });
        let (faces, detection_error) = match detection {
            Ok(faces) => (faces, None),
            Err(err @ PipelineError::Detection(_)) => {
                warn!("[{}] {}: {err}", session.id(), image.path);
                (Vec::new(), Some(err))
            }
            Err(err) => return Err(err),
        };

        self.enter(session, ProcessingStage::FaceAnalysis);
        let face = match faces.first() {
            Some(primary) => {
                let features = self.run_stage(session, image, |working, scale| {
                    self.extract_features(working, primary.bbox.scaled(scale))
                        .map(|f| f.scaled(1.0 / scale))
                })?;
                Some(FaceEvidence {
                    detection: *primary,
                    features,
                })
            }
            None => None,
        };

        self.enter(session, ProcessingStage::BackgroundAnalysis);
        let mask = match self.run_stage(session, image, |working, _| self.segment(working)) {
            Ok(mask) => mask,
            Err(err) if self.degrades(ProcessingStage::BackgroundAnalysis, &err) => {
                warn!(
                    "[{}] segmentation unavailable, using head-and-shoulders estimate: {err}",
                    session.id()
                );
                session.note_recovery_attempt();
                session.mark_recovered();
                None
            }
            Err(err) => return Err(err),
        };

        self.enter(session, ProcessingStage::QualityAssessment);
        let face_box = face.as_ref().map(|f| f.detection.bbox.clamp_to(w, h));
        let quality = self.run_stage(session, image, |working, scale| {
            self.quality.assess(working, face_box.map(|b| b.scaled(scale)))
        })?;

        self.enter(session, ProcessingStage::IcaoValidation);
        let (report, probe_mask, offset) = {
            let evidence = evidence(image, &quality, face.as_ref(), faces.len(), mask.as_ref());
            let report = self.rules.validate_complete_compliance(&evidence, params);
            let probe_mask = evidence
                .background_mask()
                .map(|m| Arc::new(m.into_owned()));
            (report, probe_mask, horizontal_offset(&evidence))
        };

        let consistency = mean_confidence(&report);
        let mut inconsistency = None;
        if face.is_some() && consistency < self.config.consistency_floor {
            let err = PipelineError::ValidationInconsistency(format!(
                "mean rule confidence {consistency:.2} is below {:.2}",
                self.config.consistency_floor
            ));
            warn!("[{}] {err}; flagging for review", session.id());
            session.record_error(&err);
            if self.degrades(ProcessingStage::IcaoValidation, &err) {
                session.note_recovery_attempt();
            }
            inconsistency = Some(err);
        }

        let detector_confidence = face.as_ref().map(|f| f.detection.confidence);
        let (confidence, requires_manual_review) = self.review(
            session,
            detector_confidence,
            consistency,
            inconsistency.is_some(),
        );
        debug!(
            "[{}] {}: compliance {:.1}, confidence {confidence:.2}{}",
            session.id(),
            params.variation,
            report.overall_score,
            if requires_manual_review { ", needs review" } else { "" }
        );

        let hints = correction_hints(params, face.as_ref(), offset, w);
        Ok(Validated {
            result: ValidationResult {
                format: params.variation.name().to_string(),
                report: report.clone(),
                quality: quality.clone(),
                face: face.as_ref().map(|f| f.detection),
                features: face.map(|f| f.features),
                confidence,
                requires_manual_review,
            },
            probe: ProbeResult {
                report,
                quality,
                mask: probe_mask,
            },
            hints,
            detection_error,
            inconsistency,
            detector_confidence,
            consistency,
        })
    }

    /// Re-validates a corrected image: no recovery, no cache.
    fn probe(&self, image: &ImageInfo, params: &RuleParameters) -> Result<ProbeResult> {
        let faces = self.detect(image)?;
        let face = match faces.first() {
            Some(primary) => Some(FaceEvidence {
                detection: *primary,
                features: self.extract_features(image, primary.bbox)?,
            }),
            None => None,
        };
        let mask = self.segment(image).unwrap_or_else(|err| {
            debug!("probe segmentation failed: {err}");
            None
        });
        let face_box = face
            .as_ref()
            .map(|f| f.detection.bbox.clamp_to(image.width, image.height));
        let quality = self.quality.assess(image, face_box)?;
        let evidence = evidence(image, &quality, face.as_ref(), faces.len(), mask.as_ref());
        let report = self.rules.validate_complete_compliance(&evidence, params);
        let mask = evidence
            .background_mask()
            .map(|m| Arc::new(m.into_owned()));
        drop(evidence);
        Ok(ProbeResult {
            report,
            quality,
            mask,
        })
    }

    fn auto_fix(
        self: &Arc<Self>,
        image: &ImageInfo,
        params: &RuleParameters,
        validated: &Validated,
    ) -> Result<AutoFixResult> {
        let inner = Arc::clone(self);
        let image = image.clone();
        let params = params.clone();
        let before = validated.probe.clone();
        let hints = validated.hints.clone();
        self.timed(ProcessingStage::AutoFix, move || {
            let probe = |candidate: &ImageInfo| inner.probe(candidate, &params);
            inner.autofix.run(&image, &before, &hints, &probe)
        })
    }

    fn drive(
        self: &Arc<Self>,
        session: &mut ProcessingSession,
        input: ImageInput,
        format: &str,
        options: &ProcessingOptions,
    ) -> Result<Outcome> {
        let params = self
            .parameters(format)
            .inspect_err(|e| session.record_error(e))?;

        let image = match input {
            ImageInput::Decoded(image) => image,
            ImageInput::Path(path) => self.load(session, &path)?,
        };
        if image.is_empty() {
            let err = PipelineError::Input(format!("{} has no pixels", image.path));
            session.record_error(&err);
            return Err(err);
        }

        let (validated, cache_hit) = self.validated(session, &image, &params);
        let validated = match validated {
            Ok(validated) => validated,
            Err(err) => {
                if cache_hit {
                    session.record_error(&err);
                }
                return Err(err);
            }
        };

        let auto_fix = if options.auto_fix && validated.result.face.is_some() {
            self.enter(session, ProcessingStage::AutoFix);
            match self.auto_fix(&image, &params, &validated) {
                Ok(result) => Some(result),
                Err(err) => {
                    session.record_error(&err);
                    if !self.degrades(ProcessingStage::AutoFix, &err) {
                        return Err(err);
                    }
                    warn!("[{}] auto-fix abandoned: {err}", session.id());
                    session.note_recovery_attempt();
                    None
                }
            }
        } else {
            None
        };

        Ok(Outcome {
            failure: validated.detection_error.as_ref().map(ToString::to_string),
            validation: Some(validated.result),
            auto_fix,
            cache_hit,
        })
    }

    fn finish(&self, session: ProcessingSession, outcome: Result<Outcome>) -> ProcessingResult {
        let session_id = session.id().to_string();
        let path = session.path().to_string();
        let (outcome, error_message) = match outcome {
            Ok(outcome) => {
                let failure = outcome.failure.clone();
                (outcome, failure)
            }
            Err(err) => {
                warn!("[{session_id}] {path} failed: {err}");
                (Outcome::default(), Some(err.to_string()))
            }
        };
        let success = error_message.is_none();
        let terminal = if success {
            ProcessingStage::Complete
        } else {
            ProcessingStage::Failed
        };

        let (processing_metrics, errors) = session.finish(terminal, outcome.cache_hit);
        self.sessions().remove(&session_id);
        self.emit(&session_id, &ProcessingProgress::entering(terminal));

        let result = ProcessingResult {
            session_id,
            path,
            success,
            validation_result: outcome.validation,
            auto_fix_result: outcome.auto_fix,
            processing_metrics,
            error_message,
            errors,
        };
        self.metrics.record(&result);
        debug!(
            "[{}] {terminal} in {} ms",
            result.session_id, result.processing_metrics.processing_ms
        );
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct NoLoader;

    impl ImageLoader for NoLoader {
        fn load(&self, path: &Path) -> anyhow::Result<ImageInfo> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
            .into())
        }
    }

    struct NoFaces;

    impl FaceDetector for NoFaces {
        fn detect_faces(&self, _image: &ImageInfo) -> anyhow::Result<Vec<FaceDetection>> {
            Ok(Vec::new())
        }

        fn extract_face_features(
            &self,
            _image: &ImageInfo,
            _bbox: &BoundingBox,
        ) -> anyhow::Result<FaceFeatures> {
            anyhow::bail!("no face")
        }
    }

    fn controller() -> ProcessingController {
        ProcessingController::builder(Arc::new(NoLoader), Arc::new(NoFaces))
            .config(ControllerConfig {
                workers: 2,
                stage_timeout_ms: None,
                ..ControllerConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(ControllerConfig::default().validate().is_ok());
        let bad = ControllerConfig {
            workers: 0,
            ..ControllerConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = ControllerConfig {
            pass_threshold: Some(120.0),
            ..ControllerConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_unretried_input_error() {
        let result = controller().process_image(
            std::path::PathBuf::from("/nonexistent/a.jpg"),
            "ICAO",
            &ProcessingOptions::default(),
        );
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Input);
        assert!(!result.errors[0].recovery_attempted);
        assert_eq!(result.processing_metrics.recovery_attempts, 0);
    }

    #[test]
    fn test_unknown_format_is_an_input_error() {
        let image = ImageInfo::new("a.png", image::DynamicImage::new_rgb8(30, 40));
        let result = controller().process_image(image, "MARS", &ProcessingOptions::default());
        assert!(!result.success);
        assert_eq!(result.errors[0].kind, ErrorKind::Input);
        assert!(result.error_message.unwrap().contains("unknown format"));
    }

    #[test]
    fn test_no_face_retries_enhancement_then_reports() {
        let image = ImageInfo::new("blank.png", image::DynamicImage::new_rgb8(30, 40));
        let controller = controller();
        let result = controller.process_image(image, "ICAO", &ProcessingOptions { auto_fix: true });

        assert!(!result.success);
        assert!(result.auto_fix_result.is_none());
        assert_eq!(result.processing_metrics.recovery_attempts, 3);
        let detection: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Detection)
            .collect();
        assert_eq!(detection.len(), 4);

        let validation = result.validation_result.unwrap();
        assert!((validation.report.overall_score).abs() < f64::EPSILON);
        assert!(validation.requires_manual_review);
        assert!(controller.active_sessions().is_empty());
    }

    #[test]
    fn test_progress_events_cover_the_pipeline() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let controller = controller();
        controller.register_progress(Arc::new(move |_: &str, p: &ProcessingProgress| {
            sink_events.lock().unwrap().push(p.stage);
        }));
        let image = ImageInfo::new("blank.png", image::DynamicImage::new_rgb8(30, 40));
        let _ = controller.process_image(image, "ICAO", &ProcessingOptions::default());

        let stages = events.lock().unwrap().clone();
        assert_eq!(stages.first(), Some(&ProcessingStage::ImageLoading));
        assert_eq!(stages.last(), Some(&ProcessingStage::Failed));
        assert!(stages.contains(&ProcessingStage::IcaoValidation));
    }

    #[test]
    fn test_metrics_count_processed_images() {
        let controller = controller();
        let image = ImageInfo::new("blank.png", image::DynamicImage::new_rgb8(30, 40));
        let _ = controller.process_image(image, "ICAO", &ProcessingOptions::default());
        let metrics = controller.get_processing_metrics();
        assert_eq!(metrics.total_processed, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.active_sessions, 0);
        assert_eq!(metrics.errors_by_kind.get(&ErrorKind::Detection), Some(&4));
    }
}
