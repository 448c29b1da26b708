//! Partition and prioritisation of compliance issues.

use crate::domain::{ComplianceReport, IssueAnalysis, PrioritizedIssue, Severity};

/// Splits a report's issues into fixable and unfixable sets and orders the
/// fixable ones by priority.
///
/// The sort is stable, so issues of equal priority keep report order.
#[must_use]
pub fn analyze_issues(report: &ComplianceReport) -> IssueAnalysis {
    let (fixable_issues, unfixable_issues): (Vec<_>, Vec<_>) = report
        .issue_summary
        .iter()
        .cloned()
        .partition(|issue| issue.auto_fixable);

    let mut fix_priority: Vec<PrioritizedIssue> = fixable_issues
        .iter()
        .map(|issue| PrioritizedIssue {
            priority: issue.severity.fix_priority(),
            issue: issue.clone(),
        })
        .collect();
    fix_priority.sort_by_key(|p| p.priority);

    let critical_count = report
        .issue_summary
        .iter()
        .filter(|issue| issue.severity == Severity::Critical)
        .count();

    IssueAnalysis {
        fixable_issues,
        unfixable_issues,
        fix_priority,
        critical_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FixPriority, IssueCategory, RuleCategory, RuleResult};

    fn failing(id: &str, severity: Severity, issue_category: IssueCategory, fixable: bool) -> RuleResult {
        RuleResult {
            rule_id: id.to_string(),
            rule_name: id.to_lowercase(),
            category: RuleCategory::StyleLighting,
            issue_category,
            passes: false,
            measured_value: 0.0,
            required_value: 1.0,
            confidence: 0.8,
            severity,
            regulation_reference: String::new(),
            suggestion: String::new(),
            auto_fixable: fixable,
        }
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let report = ComplianceReport::from_results(
            "ICAO",
            vec![
                failing("A", Severity::Minor, IssueCategory::Geometry, true),
                failing("B", Severity::Critical, IssueCategory::Glasses, false),
                failing("C", Severity::Major, IssueCategory::Background, true),
                failing("D", Severity::Warning, IssueCategory::Lighting, true),
                failing("E", Severity::Major, IssueCategory::Lighting, true),
            ],
            vec![],
            50.0,
            75.0,
        );
        let analysis = analyze_issues(&report);

        assert_eq!(
            analysis.fixable_issues.len() + analysis.unfixable_issues.len(),
            report.issue_summary.len()
        );
        assert!(analysis
            .fixable_issues
            .iter()
            .all(|f| !analysis.unfixable_issues.contains(f)));
        assert_eq!(analysis.critical_count, 1);

        let order: Vec<(&str, FixPriority)> = analysis
            .fix_priority
            .iter()
            .map(|p| (p.issue.rule_id.as_str(), p.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("C", FixPriority::High),
                ("E", FixPriority::High),
                ("A", FixPriority::Medium),
                ("D", FixPriority::Low),
            ]
        );
    }

    #[test]
    fn test_clean_report_has_nothing_to_fix() {
        let report = ComplianceReport::from_results("ICAO", vec![], vec![], 100.0, 75.0);
        let analysis = analyze_issues(&report);
        assert!(!analysis.has_fixable());
        assert!(analysis.unfixable_issues.is_empty());
    }
}
