//! Population-level prevalence estimates and breakdowns.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::{Histogram, ProjectStatistics, severity_histogram};
use crate::error::Result;
use crate::stats::{ConfidenceInterval, interval, safe_ratio};

/// Number of rule entries listed as top issues by default.
pub const DEFAULT_TOP_N: usize = 10;

/// One histogram entry, ranked by count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCount {
    /// Category, severity, or rule.
    pub key: String,
    /// Occurrences across the population.
    pub count: usize,
    /// Share of all issues, in percent.
    pub percentage: f64,
}

/// Final population report.
///
/// `analyzed_projects + failed_projects == total_candidates` and
/// `projects_with_issues + projects_without_issues == analyzed_projects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationReport {
    /// Sample units considered: analyzed plus hard failures.
    pub total_candidates: usize,
    /// Units analyzed to completion.
    pub analyzed_projects: usize,
    /// Units that could not be analyzed at all.
    pub failed_projects: usize,
    /// Analyzed units with at least one violation.
    pub projects_with_issues: usize,
    /// Analyzed units without violations.
    pub projects_without_issues: usize,
    /// Confidence level used for the interval.
    pub confidence_level: f64,
    /// Prevalence estimate and interval, in percent, over `total_candidates`.
    pub prevalence: ConfidenceInterval,
    /// Issues summed over analyzed units.
    pub total_issues: usize,
    /// Files summed over analyzed units.
    pub total_files: usize,
    /// Mean issues per analyzed unit.
    pub average_issues_per_project: f64,
    /// Mean issues per analyzed file.
    pub average_issues_per_file: f64,
    /// Issues per category, most frequent first.
    pub categories: Vec<RankedCount>,
    /// Issues per severity, most frequent first.
    pub severities: Vec<RankedCount>,
    /// Issues per rule, most frequent first.
    pub issue_types: Vec<RankedCount>,
    /// Leading entries of `issue_types`.
    pub top_issues: Vec<RankedCount>,
}

/// Combine per-project statistics and a hard-failure count into a report.
///
/// The input order of `projects` does not affect the output.
pub fn aggregate_population(
    projects: &[ProjectStatistics],
    hard_failures: usize,
    confidence_level: f64,
    top_n: usize,
) -> Result<PopulationReport> {
    let analyzed = projects.len();
    let total_candidates = analyzed + hard_failures;
    let with_issues = projects.iter().filter(|stats| stats.has_issues()).count();

    let prevalence = interval(with_issues, total_candidates, confidence_level)?.as_percentages();

    let mut categories = Histogram::new();
    let mut severities = severity_histogram();
    let mut issue_types = Histogram::new();
    let mut total_issues = 0usize;
    let mut total_files = 0usize;
    for stats in projects {
        total_issues += stats.total_issues;
        total_files += stats.total_files;
        merge(&mut categories, &stats.categories);
        merge(&mut severities, &stats.severities);
        merge(&mut issue_types, &stats.issue_types);
    }

    let issue_types = rank(&issue_types, total_issues);
    let top_issues = issue_types.iter().take(top_n).cloned().collect();

    Ok(PopulationReport {
        total_candidates,
        analyzed_projects: analyzed,
        failed_projects: hard_failures,
        projects_with_issues: with_issues,
        projects_without_issues: analyzed - with_issues,
        confidence_level,
        prevalence,
        total_issues,
        total_files,
        average_issues_per_project: safe_ratio(total_issues, analyzed),
        average_issues_per_file: safe_ratio(total_issues, total_files),
        categories: rank(&categories, total_issues),
        severities: rank(&severities, total_issues),
        issue_types,
        top_issues,
    })
}

fn merge(into: &mut Histogram, from: &Histogram) {
    for (key, count) in from {
        *into.entry(key.clone()).or_insert(0) += count;
    }
}

/// Entries sorted by count descending, ties by key ascending.
pub fn rank(histogram: &Histogram, total: usize) -> Vec<RankedCount> {
    let mut entries: Vec<RankedCount> = histogram
        .iter()
        .map(|(key, count)| RankedCount {
            key: key.clone(),
            count: *count,
            percentage: safe_ratio(*count, total) * 100.0,
        })
        .collect();
    entries.sort_by(|a, b| match b.count.cmp(&a.count) {
        Ordering::Equal => a.key.cmp(&b.key),
        other => other,
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::z_score;

    fn project(issues: &[(&str, &str, &str)], files: usize) -> ProjectStatistics {
        let mut stats = ProjectStatistics {
            total_files: files,
            files_with_issues: usize::from(!issues.is_empty()),
            total_issues: issues.len(),
            ..ProjectStatistics::default()
        };
        for (category, severity, rule) in issues {
            *stats.categories.entry(category.to_string()).or_insert(0) += 1;
            *stats.severities.entry(severity.to_string()).or_insert(0) += 1;
            *stats.issue_types.entry(rule.to_string()).or_insert(0) += 1;
        }
        stats
    }

    fn sample_projects() -> Vec<ProjectStatistics> {
        vec![
            project(&[("javascript", "error", "es-x/no-optional-chaining")], 4),
            project(
                &[
                    ("typescript", "error", "es-x/no-class-fields"),
                    ("typescript", "warning", "es-x/no-optional-chaining"),
                ],
                6,
            ),
            project(&[("jsx", "info", "es-x/no-spread-elements")], 2),
            project(&[], 8),
        ]
    }

    #[test]
    fn scenario_with_hard_failure() {
        let report = aggregate_population(&sample_projects(), 1, 0.95, DEFAULT_TOP_N).expect("report");

        assert_eq!(report.total_candidates, 5);
        assert_eq!(report.analyzed_projects, 4);
        assert_eq!(report.failed_projects, 1);
        assert_eq!(report.projects_with_issues, 3);
        assert_eq!(report.projects_without_issues, 1);

        let z = z_score(0.95).expect("z");
        let margin = z * (0.6f64 * 0.4 / 5.0).sqrt();
        assert!((report.prevalence.estimate - 60.0).abs() < 1e-9);
        assert!((report.prevalence.margin - margin * 100.0).abs() < 1e-9);
        assert!((report.prevalence.lower - (0.6 - margin) * 100.0).abs() < 1e-9);
        assert_eq!(report.prevalence.upper, 100.0);
    }

    #[test]
    fn invariants_hold() {
        let report = aggregate_population(&sample_projects(), 3, 0.9, DEFAULT_TOP_N).expect("report");
        assert_eq!(
            report.analyzed_projects + report.failed_projects,
            report.total_candidates
        );
        assert_eq!(
            report.projects_with_issues + report.projects_without_issues,
            report.analyzed_projects
        );
    }

    #[test]
    fn averages_guard_against_empty_input() {
        let report = aggregate_population(&[], 2, 0.95, DEFAULT_TOP_N).expect("report");
        assert_eq!(report.total_candidates, 2);
        assert_eq!(report.average_issues_per_project, 0.0);
        assert_eq!(report.average_issues_per_file, 0.0);
        assert_eq!(report.prevalence.estimate, 0.0);

        let empty = aggregate_population(&[], 0, 0.95, DEFAULT_TOP_N).expect("report");
        assert_eq!(empty.prevalence, ConfidenceInterval::EMPTY);
    }

    #[test]
    fn averages_use_issue_totals() {
        let report = aggregate_population(&sample_projects(), 0, 0.95, DEFAULT_TOP_N).expect("report");
        assert_eq!(report.total_issues, 4);
        assert_eq!(report.total_files, 20);
        assert_eq!(report.average_issues_per_project, 1.0);
        assert_eq!(report.average_issues_per_file, 0.2);
    }

    #[test]
    fn breakdowns_are_ranked_with_stable_ties() {
        let report = aggregate_population(&sample_projects(), 0, 0.95, 2).expect("report");

        let rules: Vec<(&str, usize)> = report
            .issue_types
            .iter()
            .map(|entry| (entry.key.as_str(), entry.count))
            .collect();
        assert_eq!(
            rules,
            vec![
                ("es-x/no-optional-chaining", 2),
                ("es-x/no-class-fields", 1),
                ("es-x/no-spread-elements", 1),
            ]
        );
        assert_eq!(report.top_issues.len(), 2);
        assert_eq!(report.top_issues[0].percentage, 50.0);

        let severities: Vec<&str> = report.severities.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(severities, vec!["error", "info", "warning"]);
        assert_eq!(report.categories[0].key, "typescript");
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut reversed = sample_projects();
        reversed.reverse();
        let a = aggregate_population(&sample_projects(), 1, 0.95, DEFAULT_TOP_N).expect("report");
        let b = aggregate_population(&reversed, 1, 0.95, DEFAULT_TOP_N).expect("report");
        assert_eq!(a, b);
    }
}
