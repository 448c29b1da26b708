//! Issue analysis, correction plans and auto-fix results.

use std::sync::Arc;

use serde::Serialize;

use super::{
    BackgroundMask, ComplianceIssue, ComplianceReport, FixPriority, ImageInfo, IssueCategory,
    QualityAxis,
};

/// Correction operations, one per correctable issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Replace or even out the background.
    BackgroundCorrection,
    /// Even out exposure and shadows on the subject.
    LightingCorrection,
    /// Level head tilt and re-centre.
    GeometryCorrection,
}

impl CorrectionKind {
    /// Fixed precedence: background, then lighting, then geometry.
    pub const PRECEDENCE: [Self; 3] = [
        Self::BackgroundCorrection,
        Self::LightingCorrection,
        Self::GeometryCorrection,
    ];

    /// Correction operation for an issue category, if one exists.
    #[must_use]
    pub const fn for_category(category: IssueCategory) -> Option<Self> {
        match category {
            IssueCategory::Background => Some(Self::BackgroundCorrection),
            IssueCategory::Lighting => Some(Self::LightingCorrection),
            IssueCategory::Geometry => Some(Self::GeometryCorrection),
            _ => None,
        }
    }

    /// Operations this one structurally depends on.
    ///
    /// Lighting correction reads the finalised background mask.
    #[must_use]
    pub const fn depends_on(self) -> &'static [Self] {
        match self {
            Self::LightingCorrection => &[Self::BackgroundCorrection],
            Self::BackgroundCorrection | Self::GeometryCorrection => &[],
        }
    }

    /// Whether this operation has historically caused regressions.
    #[must_use]
    pub const fn needs_checkpoint(self) -> bool {
        matches!(self, Self::BackgroundCorrection | Self::LightingCorrection)
    }

    /// Operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackgroundCorrection => "background_correction",
            Self::LightingCorrection => "lighting_correction",
            Self::GeometryCorrection => "geometry_correction",
        }
    }
}

impl std::fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk that corrections degrade the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Normal correction strength.
    Low,
    /// Two or more critical issues; corrections run at reduced strength.
    High,
}

/// An issue scheduled for correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrioritizedIssue {
    /// The issue.
    pub issue: ComplianceIssue,
    /// Scheduling priority.
    pub priority: FixPriority,
}

/// Partition of a report's issues into fixable and unfixable sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueAnalysis {
    /// Issues the correction engine can address.
    pub fixable_issues: Vec<ComplianceIssue>,
    /// Issues needing a retake.
    pub unfixable_issues: Vec<ComplianceIssue>,
    /// Fixable issues, highest priority first; ties keep report order.
    pub fix_priority: Vec<PrioritizedIssue>,
    /// Number of critical issues across both partitions.
    pub critical_count: usize,
}

impl IssueAnalysis {
    /// Whether any fixable issue exists.
    #[must_use]
    pub fn has_fixable(&self) -> bool {
        !self.fixable_issues.is_empty()
    }
}

/// Inputs handed to a correction primitive.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionParameters {
    /// Strength multiplier (1.0 normal, lower is more conservative).
    pub strength: f32,
    /// Target background colour.
    pub background_color: [u8; 3],
    /// Target mean luminance for the subject.
    pub target_luminance: f32,
    /// Tilt to remove, in degrees.
    pub roll_degrees: f32,
    /// Horizontal shift needed to centre the face, in pixels.
    pub horizontal_shift: f32,
    /// Background mask current at the time the step runs.
    #[serde(skip)]
    pub mask: Option<Arc<BackgroundMask>>,
}

impl Default for CorrectionParameters {
    fn default() -> Self {
        Self {
            strength: 1.0,
            background_color: [255, 255, 255],
            target_luminance: 150.0,
            roll_degrees: 0.0,
            horizontal_shift: 0.0,
            mask: None,
        }
    }
}

/// One correction in a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCorrection {
    /// Operation to run.
    pub kind: CorrectionKind,
    /// Parameters for the operation.
    pub parameters: CorrectionParameters,
    /// Rule ids this correction addresses.
    pub addresses: Vec<String>,
    /// Highest priority among addressed issues.
    pub priority: FixPriority,
}

/// Re-verification point after an execution step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityCheckpoint {
    /// Position in `execution_order` after which quality is verified.
    pub after_step: usize,
    /// Allowed score drop before the step is rejected.
    pub tolerance: f64,
}

/// Saved pre-correction state for an execution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollbackPoint {
    /// Position in `execution_order` this point guards.
    pub step: usize,
    /// Snapshot slot the executor stores the pre-step image in.
    pub snapshot: usize,
}

/// Ordered, checkpointed correction plan.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionPlan {
    /// Corrections in priority order.
    pub corrections: Vec<PlannedCorrection>,
    /// Indices into `corrections`, a total order respecting dependencies.
    pub execution_order: Vec<usize>,
    /// Verification points.
    pub quality_checkpoints: Vec<QualityCheckpoint>,
    /// Rollback points, one per checkpoint.
    pub rollback_points: Vec<RollbackPoint>,
    /// Expected score gain per correction.
    pub expected_improvements: Vec<(CorrectionKind, f64)>,
    /// Risk assessment governing correction strength.
    pub risk: RiskLevel,
}

impl CorrectionPlan {
    /// Whether the plan contains no corrections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Corrections in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = (usize, &PlannedCorrection)> + '_ {
        self.execution_order
            .iter()
            .enumerate()
            .filter_map(|(step, idx)| self.corrections.get(*idx).map(|c| (step, c)))
    }

    /// Checkpoint after `step`, if any.
    #[must_use]
    pub fn checkpoint_after(&self, step: usize) -> Option<&QualityCheckpoint> {
        self.quality_checkpoints.iter().find(|c| c.after_step == step)
    }

    /// Rollback point guarding `step`, if any.
    #[must_use]
    pub fn rollback_point(&self, step: usize) -> Option<&RollbackPoint> {
        self.rollback_points.iter().find(|r| r.step == step)
    }

    /// Whether the plan contains a correction of `kind`.
    #[must_use]
    pub fn contains(&self, kind: CorrectionKind) -> bool {
        self.corrections.iter().any(|c| c.kind == kind)
    }
}

/// What happened to one planned correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// Applied and kept.
    Applied,
    /// Applied, rejected by the verifier, and undone.
    RolledBack,
    /// Not run because a dependency was rolled back or failed.
    Skipped,
    /// The primitive returned an error; image unchanged.
    Failed,
}

/// Per-correction execution record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    /// Operation.
    pub kind: CorrectionKind,
    /// What happened.
    pub status: CorrectionStatus,
    /// Compliance score change measured at the checkpoint (0 if unchecked).
    pub compliance_delta: f64,
    /// Reason for rollback, skip or failure.
    pub detail: String,
}

/// Before/after comparison of two compliance reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImprovementMetrics {
    /// `after.overall_score - before.overall_score`; negative on regression.
    pub overall_compliance_improvement: f64,
    /// Violations present before and gone after.
    pub resolved_issues: usize,
    /// Violations absent before and present after.
    pub new_issues: usize,
    /// Applied corrections over planned corrections.
    pub success_rate: f64,
    /// Confidence in the improvement (0.0 to 1.0).
    pub confidence_score: f64,
}

/// Per-axis quality comparison of an image before and after correction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImprovementAssessment {
    /// `after - before` for each quality axis.
    pub axis_deltas: Vec<(QualityAxis, f64)>,
    /// `after - before` for the overall quality score.
    pub overall_delta: f64,
    /// Axes that lost more than the tolerance.
    pub degradation_areas: Vec<QualityAxis>,
    /// Follow-up advice for degraded axes.
    pub recommendations: Vec<String>,
}

/// Result of one auto-fix invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AutoFixResult {
    /// At least one correction applied, quality preserved, and no
    /// previously fixable critical issue left unresolved.
    pub success: bool,
    /// Corrections kept in the final image, in execution order.
    pub applied_corrections: Vec<CorrectionKind>,
    /// Per-correction records in execution order.
    pub outcomes: Vec<CorrectionOutcome>,
    /// Whether final quality stayed within tolerance of the original.
    pub quality_preserved: bool,
    /// Report before any correction.
    pub before_report: ComplianceReport,
    /// Report for the final image.
    pub after_report: ComplianceReport,
    /// Before/after comparison.
    pub improvement: ImprovementMetrics,
    /// Per-axis quality comparison of the original and final image.
    pub quality_assessment: ImprovementAssessment,
    /// The corrected image.
    #[serde(skip)]
    pub corrected_image: Option<ImageInfo>,
}
