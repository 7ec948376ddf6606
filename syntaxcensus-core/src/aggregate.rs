//! Per-project reduction of file analysis results.

use crate::domain::{FileAnalysisResult, Histogram, ProjectStatistics};

/// Reduce a project's file results into project statistics.
///
/// A failed file counts towards `total_files` and `failed_files` but never
/// towards `files_with_issues`. Missing severities count as `info` and missing
/// categories as `unknown`.
pub fn aggregate_files(results: &[FileAnalysisResult]) -> ProjectStatistics {
    let mut stats = ProjectStatistics {
        total_files: results.len(),
        ..ProjectStatistics::default()
    };

    for result in results {
        if result.is_failure() {
            stats.failed_files += 1;
        }
        if result.has_issues() {
            stats.files_with_issues += 1;
        }
        stats.total_issues += result.violations.len();

        for violation in &result.violations {
            bump(&mut stats.categories, violation.effective_category());
            bump(&mut stats.severities, violation.effective_severity().as_str());
            bump(&mut stats.issue_types, violation.effective_rule());
        }
    }

    stats
}

/// Add one occurrence of `key`.
pub(crate) fn bump(histogram: &mut Histogram, key: &str) {
    *histogram.entry(key.to_string()).or_insert(0) += 1;
}
