//! Static rule metadata.

use crate::domain::{IssueCategory, RuleCategory, RuleResult, Severity};

/// Identity and classification of one regulation clause.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    /// Rule identifier.
    pub id: &'static str,
    /// Short name.
    pub name: &'static str,
    /// Producing category.
    pub category: RuleCategory,
    /// Issue category on failure.
    pub issue_category: IssueCategory,
    /// Severity on failure.
    pub severity: Severity,
    /// Whether a failure can be corrected automatically.
    pub auto_fixable: bool,
}

impl RuleSpec {
    /// Regulation reference for this rule.
    #[must_use]
    pub fn reference(&self) -> String {
        let section = self.id.strip_prefix("ICAO.").unwrap_or(self.id);
        format!("ICAO Doc 9303 Part 3 Section {section}")
    }

    /// Builds a result. The suggestion is dropped when the rule passes.
    #[must_use]
    pub fn outcome(
        &self,
        passes: bool,
        measured_value: f64,
        required_value: f64,
        confidence: f32,
        suggestion: impl Into<String>,
    ) -> RuleResult {
        RuleResult {
            rule_id: self.id.to_string(),
            rule_name: self.name.to_string(),
            category: self.category,
            issue_category: self.issue_category,
            passes,
            measured_value,
            required_value,
            confidence: confidence.clamp(0.0, 1.0),
            severity: self.severity,
            regulation_reference: self.reference(),
            suggestion: if passes { String::new() } else { suggestion.into() },
            auto_fixable: self.auto_fixable && self.issue_category.is_correctable(),
        }
    }
}

/// Confidence from the margin between a measurement and its bound.
///
/// Measurements at the bound get 0.5; a margin of `scale` or more gets 1.0.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn margin_confidence(measured: f64, bound: f64, scale: f64) -> f32 {
    if scale <= 0.0 || !measured.is_finite() {
        return 0.5;
    }
    let margin = ((measured - bound).abs() / scale).min(1.0);
    (0.5 + 0.5 * margin) as f32
}
