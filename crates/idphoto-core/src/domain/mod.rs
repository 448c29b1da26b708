//! Core domain types for identity photo compliance.

mod compliance;
mod correction;
mod face;
mod image;
mod processing;
mod quality;

pub use compliance::{
    CategoryScore, ComplianceIssue, ComplianceReport, FixPriority, IssueCategory, RuleCategory,
    RuleResult, Severity,
};
pub use correction::{
    AutoFixResult, CorrectionKind, CorrectionOutcome, CorrectionParameters, CorrectionPlan,
    CorrectionStatus, ImprovementAssessment, ImprovementMetrics, IssueAnalysis,
    PlannedCorrection, PrioritizedIssue, QualityCheckpoint, RiskLevel, RollbackPoint,
};
pub use face::{FaceDetection, FaceFeatures, FaceOrientation, FacialFeature, FeatureVisibility};
pub use image::{BackgroundMask, BoundingBox, ImageDimensions, ImageInfo, Point};
pub use processing::{
    ErrorContext, ImageInput, ImageMetrics, ProcessingProgress, ProcessingResult,
    ProcessingStage, ValidationResult,
};
pub use quality::{OverallQualityScore, QualityAxis, QualityDetails, QualityGrade, QualityMetrics};
