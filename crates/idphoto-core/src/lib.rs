//! ID Photo Core - Domain logic for identity photo compliance
//!
//! This crate contains the domain types, ports, and the engines that validate
//! and correct identity photographs: quality scoring, compliance rules,
//! auto-fix planning and execution, and the processing controller.

pub mod autofix;
pub mod domain;
pub mod error;
pub mod imaging;
pub mod pipeline;
pub mod ports;
pub mod quality;
pub mod rules;

pub use autofix::{AutoFixConfig, AutoFixEngine, ComplianceProbe, ProbeResult};
pub use domain::{
    AutoFixResult, BackgroundMask, BoundingBox, ComplianceIssue, ComplianceReport, CorrectionKind,
    CorrectionPlan, FaceDetection, FaceFeatures, ImageInfo, ImageInput, IssueAnalysis,
    ProcessingProgress, ProcessingResult, ProcessingStage, QualityMetrics, RuleResult, Severity,
    ValidationResult,
};
pub use error::{ErrorKind, ErrorSeverity, PipelineError};
pub use pipeline::{
    BatchResult, ControllerConfig, ErrorHandler, MetricsReporter, ProcessingController,
    ProcessingMetrics, ProcessingOptions,
};
pub use ports::{
    BackgroundSegmenter, CorrectionPrimitive, FaceDetector, ImageLoader, ImageSource,
    ProgressSink, ResultOutput,
};
pub use quality::{QualityConfig, QualityEngine};
pub use rules::{CountryVariation, RuleParameters, RulesEngine};
