//! Sequential correction execution with checkpoints and rollback.

use std::sync::Arc;

use tracing::{debug, warn};

use super::planner::unresolved_critical;
use super::verifier::{assess_improvement, calculate_improvement_metrics, verify_quality_preserved};
use super::{analyze_issues, ComplianceProbe, ProbeResult};
use crate::domain::{
    AutoFixResult, CorrectionKind, CorrectionOutcome, CorrectionPlan, CorrectionStatus, ImageInfo,
};
use crate::error::{PipelineError, Result};
use crate::ports::CorrectionPrimitive;

fn record(
    kind: CorrectionKind,
    status: CorrectionStatus,
    compliance_delta: f64,
    detail: impl Into<String>,
) -> CorrectionOutcome {
    CorrectionOutcome {
        kind,
        status,
        compliance_delta,
        detail: detail.into(),
    }
}

/// Runs `plan` against `image`.
///
/// Steps run strictly in `execution_order`. After a checkpointed step the
/// corrected image is re-probed; if compliance or quality dropped by more
/// than the checkpoint tolerance the step is undone by restoring its
/// snapshot, and steps that depend on it are skipped. Independent steps
/// still run.
///
/// # Errors
///
/// Returns an error only if the final image cannot be probed.
pub fn apply_corrections(
    image: &ImageInfo,
    plan: &CorrectionPlan,
    before: &ProbeResult,
    primitives: &[Arc<dyn CorrectionPrimitive>],
    probe: &dyn ComplianceProbe,
    tolerance: f64,
) -> Result<AutoFixResult> {
    let mut current = image.to_rgb8();
    // probe of `current`; `None` after an unchecked step changed it
    let mut baseline: Option<ProbeResult> = Some(before.clone());
    let mut mask = before.mask.clone();
    let mut snapshots: Vec<Option<image::RgbImage>> = vec![None; plan.rollback_points.len()];
    let mut blocked: Vec<CorrectionKind> = Vec::new();
    let mut outcomes = Vec::with_capacity(plan.corrections.len());
    let mut applied = Vec::new();

    for (step, planned) in plan.ordered() {
        let kind = planned.kind;

        if let Some(dep) = kind.depends_on().iter().find(|d| blocked.contains(d)) {
            debug!("skipping {kind}: {dep} was not applied");
            blocked.push(kind);
            outcomes.push(record(
                kind,
                CorrectionStatus::Skipped,
                0.0,
                format!("depends on {dep}, which was not applied"),
            ));
            continue;
        }

        let Some(primitive) = primitives.iter().find(|p| p.kind() == kind) else {
            warn!("no correction primitive registered for {kind}");
            blocked.push(kind);
            outcomes.push(record(
                kind,
                CorrectionStatus::Failed,
                0.0,
                "no correction primitive registered",
            ));
            continue;
        };

        let rollback = plan.rollback_point(step).copied();
        if let Some(point) = rollback {
            if let Some(slot) = snapshots.get_mut(point.snapshot) {
                *slot = Some(current.clone());
            }
        }

        let mut params = planned.parameters.clone();
        params.mask.clone_from(&mask);
        let corrected = match primitive.apply(&current, &params) {
            Ok(img) if img.dimensions() == current.dimensions() => img,
            Ok(img) => {
                let (w, h) = img.dimensions();
                warn!("{kind} changed image size to {w}x{h}; discarding");
                blocked.push(kind);
                outcomes.push(record(
                    kind,
                    CorrectionStatus::Failed,
                    0.0,
                    format!("correction changed image size to {w}x{h}"),
                ));
                continue;
            }
            Err(e) => {
                warn!("{kind} failed: {e:#}");
                blocked.push(kind);
                outcomes.push(record(kind, CorrectionStatus::Failed, 0.0, format!("{e:#}")));
                continue;
            }
        };

        let Some(checkpoint) = plan.checkpoint_after(step) else {
            debug!("applied {kind} (unchecked)");
            current = corrected;
            baseline = None;
            applied.push(kind);
            outcomes.push(record(kind, CorrectionStatus::Applied, 0.0, ""));
            continue;
        };

        let reference = match baseline.take() {
            Some(reference) => reference,
            None => probe.probe(&image.with_rgb(current.clone()))?,
        };
        let verdict = probe
            .probe(&image.with_rgb(corrected.clone()))
            .map(|after| {
                let delta = after.report.overall_score - reference.report.overall_score;
                let kept = verify_quality_preserved(&reference, &after, checkpoint.tolerance);
                (after, delta, kept)
            });

        match verdict {
            Ok((after, delta, true)) => {
                debug!("applied {kind}: compliance {delta:+.1}");
                current = corrected;
                if after.mask.is_some() {
                    mask.clone_from(&after.mask);
                }
                baseline = Some(after);
                applied.push(kind);
                outcomes.push(record(kind, CorrectionStatus::Applied, delta, ""));
            }
            Ok((_, delta, false)) => {
                let regression = PipelineError::AutoFixRegression {
                    correction: kind,
                    delta,
                };
                warn!("{regression}; rolling back");
                if let Some(snapshot) = rollback
                    .and_then(|p| snapshots.get_mut(p.snapshot))
                    .and_then(Option::take)
                {
                    current = snapshot;
                }
                baseline = Some(reference);
                blocked.push(kind);
                outcomes.push(record(
                    kind,
                    CorrectionStatus::RolledBack,
                    delta,
                    regression.to_string(),
                ));
            }
            Err(e) => {
                warn!("could not verify {kind}: {e}; rolling back");
                if let Some(snapshot) = rollback
                    .and_then(|p| snapshots.get_mut(p.snapshot))
                    .and_then(Option::take)
                {
                    current = snapshot;
                }
                baseline = Some(reference);
                blocked.push(kind);
                outcomes.push(record(
                    kind,
                    CorrectionStatus::Failed,
                    0.0,
                    format!("verification failed: {e}"),
                ));
            }
        }
    }

    let corrected_image = image.with_rgb(current);
    let after = match baseline {
        Some(after) => after,
        None => probe.probe(&corrected_image)?,
    };

    let quality_preserved = verify_quality_preserved(before, &after, tolerance);
    let fixable = analyze_issues(&before.report).fixable_issues;
    let critical_left = unresolved_critical(&fixable, &after.report.issue_summary);
    let success = !applied.is_empty() && quality_preserved && !critical_left;

    let improvement = calculate_improvement_metrics(
        &before.report,
        &after.report,
        applied.len(),
        plan.corrections.len(),
    );
    debug!(
        "auto-fix on {}: {} of {} applied, compliance {:+.1}",
        image.path,
        applied.len(),
        plan.corrections.len(),
        improvement.overall_compliance_improvement
    );

    Ok(AutoFixResult {
        success,
        applied_corrections: applied,
        outcomes,
        quality_preserved,
        quality_assessment: assess_improvement(&before.quality, &after.quality, tolerance),
        before_report: before.report.clone(),
        after_report: after.report,
        improvement,
        corrected_image: Some(corrected_image),
    })
}
