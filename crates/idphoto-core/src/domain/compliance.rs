//! Rule outcomes and the aggregated compliance report.

use serde::{Deserialize, Serialize};

/// Impact of a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Rejects the photograph outright.
    Critical,
    /// Likely rejection.
    Major,
    /// Cosmetic or borderline.
    Minor,
    /// Advisory only.
    Warning,
}

impl Severity {
    /// Scheduling priority for a fixable issue of this severity.
    #[must_use]
    pub const fn fix_priority(self) -> FixPriority {
        match self {
            Self::Critical | Self::Major => FixPriority::High,
            Self::Minor => FixPriority::Medium,
            Self::Warning => FixPriority::Low,
        }
    }
}

/// Scheduling priority for a fixable issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixPriority {
    /// Fix first.
    High,
    /// Fix after high-priority issues.
    Medium,
    /// Fix last.
    Low,
}

/// Closed set of rule categories evaluated against a photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Tinted lenses, heavy frames, glare.
    Glasses,
    /// Religious and non-religious head coverings.
    HeadCovering,
    /// Neutral expression, gaze, eyes open, head straight.
    Expression,
    /// Technical image quality.
    Quality,
    /// Background, shadows, flash reflection, red-eye.
    StyleLighting,
    /// Image dimensions and face placement.
    Geometry,
}

impl RuleCategory {
    /// All categories in evaluation order.
    pub const ALL: [Self; 6] = [
        Self::Glasses,
        Self::HeadCovering,
        Self::Expression,
        Self::Quality,
        Self::StyleLighting,
        Self::Geometry,
    ];
}

/// What kind of problem an issue describes. Drives auto-fix eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Background colour or uniformity.
    Background,
    /// Shadows, reflections, exposure on the face.
    Lighting,
    /// Head tilt and framing.
    Geometry,
    /// Eyewear.
    Glasses,
    /// Head coverings and hidden features.
    HeadCovering,
    /// Facial expression and gaze.
    Expression,
    /// Technical quality (sharpness, noise, resolution).
    Quality,
    /// No usable face.
    FaceDetection,
}

impl IssueCategory {
    /// Whether the correction engine has an operation for this category.
    #[must_use]
    pub const fn is_correctable(self) -> bool {
        matches!(self, Self::Background | Self::Lighting | Self::Geometry)
    }
}

/// Outcome of evaluating one regulation clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Stable rule identifier, e.g. `ICAO.3.2.1`.
    pub rule_id: String,
    /// Short rule name.
    pub rule_name: String,
    /// Category that produced this result.
    pub category: RuleCategory,
    /// Issue category used when the rule fails.
    pub issue_category: IssueCategory,
    /// Whether the photograph satisfies the rule.
    pub passes: bool,
    /// Value measured on the photograph.
    pub measured_value: f64,
    /// Value the rule requires (a bound or target).
    pub required_value: f64,
    /// Confidence in the measurement (0.0 to 1.0).
    pub confidence: f32,
    /// Impact when violated.
    pub severity: Severity,
    /// Regulation reference.
    pub regulation_reference: String,
    /// Suggested remedy. Empty when the rule passes.
    pub suggestion: String,
    /// Whether a failure can be corrected automatically.
    pub auto_fixable: bool,
}

impl RuleResult {
    /// Converts a failing result into an issue record.
    #[must_use]
    pub fn to_issue(&self) -> ComplianceIssue {
        ComplianceIssue {
            rule_id: self.rule_id.clone(),
            category: self.issue_category,
            severity: self.severity,
            description: format!(
                "{}: measured {:.3}, required {:.3}",
                self.rule_name, self.measured_value, self.required_value
            ),
            fix_suggestion: self.suggestion.clone(),
            auto_fixable: self.auto_fixable,
            regulation_reference: self.regulation_reference.clone(),
        }
    }
}

/// A single compliance problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    /// Rule that raised the issue.
    pub rule_id: String,
    /// Issue category.
    pub category: IssueCategory,
    /// Severity of the violation.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Suggested remedy.
    pub fix_suggestion: String,
    /// Whether the correction engine can fix it.
    pub auto_fixable: bool,
    /// Regulation reference.
    pub regulation_reference: String,
}

/// Score of a single rule category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// The category.
    pub category: RuleCategory,
    /// Score 0-100 (`100 × passed / total`).
    pub score: f64,
    /// Number of passing rules.
    pub passed: usize,
    /// Number of evaluated rules.
    pub total: usize,
}

/// Aggregated result of evaluating all rule categories against one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Country variation the report was evaluated against.
    pub country_variation: String,
    /// Weighted aggregate score (0-100).
    pub overall_score: f64,
    /// True only with zero critical violations and score at or above threshold.
    pub passes_requirements: bool,
    /// All rule results in evaluation order.
    pub rule_results: Vec<RuleResult>,
    /// Per-category scores in evaluation order.
    pub category_scores: Vec<CategoryScore>,
    /// One issue per failing rule, in evaluation order.
    pub issue_summary: Vec<ComplianceIssue>,
    /// Failing critical rules.
    pub critical_violations: Vec<RuleResult>,
    /// Failing major rules.
    pub major_violations: Vec<RuleResult>,
    /// Failing minor rules.
    pub minor_violations: Vec<RuleResult>,
    /// Failing advisory rules.
    pub warnings: Vec<RuleResult>,
}

impl ComplianceReport {
    /// Builds a report from ordered rule results and pre-computed scores.
    #[must_use]
    pub fn from_results(
        country_variation: impl Into<String>,
        rule_results: Vec<RuleResult>,
        category_scores: Vec<CategoryScore>,
        overall_score: f64,
        pass_threshold: f64,
    ) -> Self {
        let mut critical = Vec::new();
        let mut major = Vec::new();
        let mut minor = Vec::new();
        let mut warnings = Vec::new();
        let mut issue_summary = Vec::new();

        for result in rule_results.iter().filter(|r| !r.passes) {
            issue_summary.push(result.to_issue());
            match result.severity {
                Severity::Critical => critical.push(result.clone()),
                Severity::Major => major.push(result.clone()),
                Severity::Minor => minor.push(result.clone()),
                Severity::Warning => warnings.push(result.clone()),
            }
        }

        let overall_score = overall_score.clamp(0.0, 100.0);
        let passes_requirements = critical.is_empty() && overall_score >= pass_threshold;

        Self {
            country_variation: country_variation.into(),
            overall_score,
            passes_requirements,
            rule_results,
            category_scores,
            issue_summary,
            critical_violations: critical,
            major_violations: major,
            minor_violations: minor,
            warnings,
        }
    }

    /// Result for a rule, if it was evaluated.
    #[must_use]
    pub fn rule(&self, rule_id: &str) -> Option<&RuleResult> {
        self.rule_results.iter().find(|r| r.rule_id == rule_id)
    }

    /// Whether the given rule was evaluated and passed.
    #[must_use]
    pub fn rule_passes(&self, rule_id: &str) -> bool {
        self.rule(rule_id).is_some_and(|r| r.passes)
    }

    /// Score for a category, if evaluated.
    #[must_use]
    pub fn category_score(&self, category: RuleCategory) -> Option<f64> {
        self.category_scores
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.score)
    }

    /// Number of failing rules.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.issue_summary.len()
    }
}
