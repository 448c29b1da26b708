//! Correction planning.

use tracing::debug;

use super::AutoFixConfig;
use crate::domain::{
    ComplianceIssue, CorrectionKind, CorrectionParameters, CorrectionPlan, ImageInfo, IssueAnalysis,
    PlannedCorrection, QualityCheckpoint, RiskLevel, RollbackPoint, Severity,
};

/// Expected compliance gain of a correction, used for reporting only.
pub trait ImprovementPolicy: Send + Sync {
    /// Expected score gain from running `kind` against `issues`.
    fn expected_improvement(&self, kind: CorrectionKind, issues: &[&ComplianceIssue]) -> f64;
}

/// Fixed gain per correction kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedImprovementPolicy {
    /// Gain for background correction.
    pub background: f64,
    /// Gain for lighting correction.
    pub lighting: f64,
    /// Gain for geometry correction.
    pub geometry: f64,
}

impl Default for FixedImprovementPolicy {
    fn default() -> Self {
        Self {
            background: 15.0,
            lighting: 10.0,
            geometry: 5.0,
        }
    }
}

impl ImprovementPolicy for FixedImprovementPolicy {
    fn expected_improvement(&self, kind: CorrectionKind, _issues: &[&ComplianceIssue]) -> f64 {
        match kind {
            CorrectionKind::BackgroundCorrection => self.background,
            CorrectionKind::LightingCorrection => self.lighting,
            CorrectionKind::GeometryCorrection => self.geometry,
        }
    }
}

/// Builds a correction plan from an issue analysis.
///
/// One correction per fixable category, executed in the fixed precedence
/// background, lighting, geometry. `hints` supplies the targets measured
/// on the image (background colour, roll, shift); strength is reduced when
/// two or more critical issues are present.
#[must_use]
pub fn plan_corrections(
    analysis: &IssueAnalysis,
    image: &ImageInfo,
    hints: &CorrectionParameters,
    config: &AutoFixConfig,
    policy: &dyn ImprovementPolicy,
) -> CorrectionPlan {
    let risk = if analysis.critical_count >= config.high_risk_critical_count {
        RiskLevel::High
    } else {
        RiskLevel::Low
    };
    let strength = match risk {
        RiskLevel::High => hints.strength * config.conservative_strength,
        RiskLevel::Low => hints.strength,
    };

    // corrections in priority order, one per kind
    let mut corrections: Vec<PlannedCorrection> = Vec::new();
    for prioritized in &analysis.fix_priority {
        let Some(kind) = CorrectionKind::for_category(prioritized.issue.category) else {
            continue;
        };
        if let Some(existing) = corrections.iter_mut().find(|c| c.kind == kind) {
            existing.addresses.push(prioritized.issue.rule_id.clone());
            continue;
        }
        corrections.push(PlannedCorrection {
            kind,
            parameters: parameters_for(kind, hints, strength, image),
            addresses: vec![prioritized.issue.rule_id.clone()],
            priority: prioritized.priority,
        });
    }

    let mut execution_order: Vec<usize> = (0..corrections.len()).collect();
    execution_order.sort_by_key(|&idx| {
        CorrectionKind::PRECEDENCE
            .iter()
            .position(|k| *k == corrections[idx].kind)
            .unwrap_or(usize::MAX)
    });

    let mut quality_checkpoints = Vec::new();
    let mut rollback_points = Vec::new();
    for (step, &idx) in execution_order.iter().enumerate() {
        if corrections[idx].kind.needs_checkpoint() {
            quality_checkpoints.push(QualityCheckpoint {
                after_step: step,
                tolerance: config.quality_tolerance,
            });
            rollback_points.push(RollbackPoint {
                step,
                snapshot: rollback_points.len(),
            });
        }
    }

    let expected_improvements = corrections
        .iter()
        .map(|c| {
            let issues: Vec<&ComplianceIssue> = analysis
                .fixable_issues
                .iter()
                .filter(|i| c.addresses.contains(&i.rule_id))
                .collect();
            (c.kind, policy.expected_improvement(c.kind, &issues))
        })
        .collect();

    debug!(
        "planned {} corrections ({} checkpoints, {:?} risk) for {}",
        corrections.len(),
        quality_checkpoints.len(),
        risk,
        image.path
    );

    CorrectionPlan {
        corrections,
        execution_order,
        quality_checkpoints,
        rollback_points,
        expected_improvements,
        risk,
    }
}

fn parameters_for(
    kind: CorrectionKind,
    hints: &CorrectionParameters,
    strength: f32,
    image: &ImageInfo,
) -> CorrectionParameters {
    #[allow(clippy::cast_precision_loss)]
    let max_shift = image.width as f32 / 4.0;
    let mut params = CorrectionParameters {
        strength,
        ..hints.clone()
    };
    if kind == CorrectionKind::GeometryCorrection {
        params.horizontal_shift = hints.horizontal_shift.clamp(-max_shift, max_shift);
    }
    params
}

/// Whether a report issue set still contains a critical issue from `fixable`.
#[must_use]
pub fn unresolved_critical(fixable: &[ComplianceIssue], remaining: &[ComplianceIssue]) -> bool {
    fixable
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .any(|i| remaining.iter().any(|r| r.rule_id == i.rule_id))
}
