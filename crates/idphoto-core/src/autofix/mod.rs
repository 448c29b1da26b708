//! Auto-fix: issue analysis, correction planning, execution and verification.

mod analyzer;
mod executor;
mod planner;
mod verifier;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use analyzer::analyze_issues;
pub use executor::apply_corrections;
pub use planner::{plan_corrections, FixedImprovementPolicy, ImprovementPolicy};
pub use verifier::{assess_improvement, calculate_improvement_metrics, verify_quality_preserved};

use crate::domain::{
    AutoFixResult, BackgroundMask, ComplianceReport, CorrectionParameters, CorrectionPlan,
    ImageInfo, IssueAnalysis, QualityMetrics,
};
use crate::error::Result;
use crate::ports::CorrectionPrimitive;

/// Validation of an image as seen by the auto-fix engine.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Compliance report.
    pub report: ComplianceReport,
    /// Quality assessment.
    pub quality: QualityMetrics,
    /// Background mask used by the validation.
    pub mask: Option<Arc<BackgroundMask>>,
}

/// Re-validates intermediate images during correction.
pub trait ComplianceProbe {
    /// Validates `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation stage fails.
    fn probe(&self, image: &ImageInfo) -> Result<ProbeResult>;
}

impl<F> ComplianceProbe for F
where
    F: Fn(&ImageInfo) -> Result<ProbeResult>,
{
    fn probe(&self, image: &ImageInfo) -> Result<ProbeResult> {
        self(image)
    }
}

/// Auto-fix configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFixConfig {
    /// Allowed score drop at a checkpoint before a correction is rolled back.
    pub quality_tolerance: f64,
    /// Strength multiplier for high-risk plans.
    pub conservative_strength: f32,
    /// Critical issue count at which a plan is high risk.
    pub high_risk_critical_count: usize,
}

impl Default for AutoFixConfig {
    fn default() -> Self {
        Self {
            quality_tolerance: 2.0,
            conservative_strength: 0.6,
            high_risk_critical_count: 2,
        }
    }
}

impl AutoFixConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error message for a negative tolerance or a strength
    /// outside 0.0-1.0.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.quality_tolerance < 0.0 {
            return Err(format!(
                "quality tolerance must not be negative, got {}",
                self.quality_tolerance
            ));
        }
        if !(0.0..=1.0).contains(&self.conservative_strength) {
            return Err(format!(
                "conservative strength must be 0.0-1.0, got {}",
                self.conservative_strength
            ));
        }
        Ok(())
    }
}

/// Analyzes, plans and applies corrections using registered primitives.
#[derive(Clone)]
pub struct AutoFixEngine {
    config: AutoFixConfig,
    primitives: Vec<Arc<dyn CorrectionPrimitive>>,
    policy: Arc<dyn ImprovementPolicy>,
}

impl std::fmt::Debug for AutoFixEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoFixEngine")
            .field("config", &self.config)
            .field(
                "primitives",
                &self.primitives.iter().map(|p| p.kind()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl AutoFixEngine {
    /// Creates an engine with the default improvement policy.
    #[must_use]
    pub fn new(config: AutoFixConfig, primitives: Vec<Arc<dyn CorrectionPrimitive>>) -> Self {
        Self {
            config,
            primitives,
            policy: Arc::new(FixedImprovementPolicy::default()),
        }
    }

    /// Replaces the expected-improvement policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ImprovementPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AutoFixConfig {
        &self.config
    }

    /// See [`analyze_issues`].
    #[must_use]
    pub fn analyze_issues(&self, report: &ComplianceReport) -> IssueAnalysis {
        analyze_issues(report)
    }

    /// See [`plan_corrections`].
    #[must_use]
    pub fn plan_corrections(
        &self,
        analysis: &IssueAnalysis,
        image: &ImageInfo,
        hints: &CorrectionParameters,
    ) -> CorrectionPlan {
        plan_corrections(analysis, image, hints, &self.config, self.policy.as_ref())
    }

    /// See [`apply_corrections`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final image cannot be probed.
    pub fn apply_corrections(
        &self,
        image: &ImageInfo,
        plan: &CorrectionPlan,
        before: &ProbeResult,
        probe: &dyn ComplianceProbe,
    ) -> Result<AutoFixResult> {
        apply_corrections(
            image,
            plan,
            before,
            &self.primitives,
            probe,
            self.config.quality_tolerance,
        )
    }

    /// Analyzes `before`, plans, and applies the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the final image cannot be probed.
    pub fn run(
        &self,
        image: &ImageInfo,
        before: &ProbeResult,
        hints: &CorrectionParameters,
        probe: &dyn ComplianceProbe,
    ) -> Result<AutoFixResult> {
        let analysis = self.analyze_issues(&before.report);
        let plan = self.plan_corrections(&analysis, image, hints);
        self.apply_corrections(image, &plan, before, probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CorrectionKind, CorrectionStatus, IssueCategory, QualityDetails, RuleCategory, RuleResult,
        Severity,
    };

    /// Marks its kind in pixel (0, 0) so the probe can tell which
    /// corrections the image has been through.
    struct Marker(CorrectionKind);

    impl CorrectionPrimitive for Marker {
        fn kind(&self) -> CorrectionKind {
            self.0
        }

        fn apply(
            &self,
            image: &image::RgbImage,
            _params: &CorrectionParameters,
        ) -> anyhow::Result<image::RgbImage> {
            let mut out = image.clone();
            let channel = match self.0 {
                CorrectionKind::BackgroundCorrection => 0,
                CorrectionKind::LightingCorrection => 1,
                CorrectionKind::GeometryCorrection => 2,
            };
            out.get_pixel_mut(0, 0).0[channel] = 1;
            Ok(out)
        }
    }

    fn failing(id: &str, category: IssueCategory, passes: bool) -> RuleResult {
        RuleResult {
            rule_id: id.to_string(),
            rule_name: id.to_string(),
            category: RuleCategory::StyleLighting,
            issue_category: category,
            passes,
            measured_value: 0.0,
            required_value: 0.0,
            confidence: 0.9,
            severity: Severity::Major,
            regulation_reference: String::new(),
            suggestion: String::new(),
            auto_fixable: true,
        }
    }

    /// Background fixes +15, lighting regresses by 5.
    fn scripted(image: &ImageInfo) -> Result<ProbeResult> {
        let [bg, light, _] = image.to_rgb8().get_pixel(0, 0).0;
        let bg_fixed = bg == 1;
        let light_applied = light == 1;
        let mut score = 70.0;
        if bg_fixed {
            score += 15.0;
        }
        if light_applied {
            score -= 5.0;
        }
        let results = vec![
            failing("ICAO.6.1.1", IssueCategory::Background, bg_fixed),
            failing("ICAO.6.2.1", IssueCategory::Lighting, false),
        ];
        Ok(ProbeResult {
            report: ComplianceReport::from_results("ICAO", results, vec![], score, 75.0),
            quality: QualityMetrics {
                sharpness_score: 90.0,
                lighting_score: 90.0,
                color_score: 90.0,
                noise_score: 90.0,
                resolution_score: 100.0,
                overall_score: 91.0,
                issues: vec![],
                suggestions: vec![],
                details: QualityDetails::default(),
            },
            mask: None,
        })
    }

    fn engine() -> AutoFixEngine {
        AutoFixEngine::new(
            AutoFixConfig::default(),
            vec![
                Arc::new(Marker(CorrectionKind::BackgroundCorrection)),
                Arc::new(Marker(CorrectionKind::LightingCorrection)),
            ],
        )
    }

    fn source() -> ImageInfo {
        ImageInfo::new("fix.png", image::DynamicImage::new_rgb8(8, 8))
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_regressing_step_is_rolled_back_alone() {
        let image = source();
        let before = scripted(&image).unwrap();
        let result = engine()
            .run(&image, &before, &CorrectionParameters::default(), &scripted)
            .unwrap();

        assert_eq!(result.applied_corrections, vec![CorrectionKind::BackgroundCorrection]);
        let statuses: Vec<CorrectionStatus> = result.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![CorrectionStatus::Applied, CorrectionStatus::RolledBack]
        );
        assert!((result.outcomes[1].compliance_delta + 5.0).abs() < 1e-9);
        assert!((result.improvement.overall_compliance_improvement - 15.0).abs() < 1e-9);
        assert!(result.success);
        assert!(result.quality_preserved);

        // the final image carries the background marker only
        let pixel = result.corrected_image.unwrap().to_rgb8().get_pixel(0, 0).0;
        assert_eq!(pixel, [1, 0, 0]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_missing_primitive_blocks_dependents() {
        let image = source();
        let before = scripted(&image).unwrap();
        let engine = AutoFixEngine::new(
            AutoFixConfig::default(),
            vec![Arc::new(Marker(CorrectionKind::LightingCorrection))],
        );
        let result = engine
            .run(&image, &before, &CorrectionParameters::default(), &scripted)
            .unwrap();
        let statuses: Vec<CorrectionStatus> = result.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![CorrectionStatus::Failed, CorrectionStatus::Skipped]);
        assert!(!result.success);
        assert!(result.improvement.overall_compliance_improvement.abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        assert!(AutoFixConfig::default().validate().is_ok());
        let bad = AutoFixConfig {
            conservative_strength: 1.5,
            ..AutoFixConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
