//! Domain entities for syntaxcensus.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frequency counts keyed by category, severity, or rule.
pub type Histogram = BTreeMap<String, usize>;

/// Category recorded when a violation carries none.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Rule identifier recorded when a violation carries none.
pub const UNKNOWN_RULE: &str = "unknown";

/// A candidate repository returned by a discovery query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    /// Stable `owner/name` identity.
    pub full_name: String,
    /// Star count.
    pub stars: u64,
    /// Fork count.
    pub forks: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Primary language tag reported by the host.
    pub language: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Clone locator.
    pub clone_url: String,
    /// Branch used for tree and content retrieval.
    pub default_branch: String,
}

/// Severity of a reported violation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocking incompatibility.
    Error,
    /// Suspicious construct.
    Warning,
    /// Informational note.
    Info,
}

impl Severity {
    /// All severities in report order.
    pub const ALL: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];

    /// Severity counted for violations that carry none.
    pub const DEFAULT: Severity = Severity::Info;

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Parse a label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "error" | "fatal" => Some(Severity::Error),
            "warning" | "warn" => Some(Severity::Warning),
            "info" | "information" | "note" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue reported by the compatibility checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Severity, when the checker reported one.
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Category tag (language or rule family).
    #[serde(default)]
    pub category: Option<String>,
    /// Rule or issue type identifier.
    #[serde(default)]
    pub rule: Option<String>,
    /// 1-based line number.
    #[serde(default)]
    pub line: Option<u32>,
    /// 1-based column number.
    #[serde(default)]
    pub column: Option<u32>,
    /// Human-readable description.
    pub message: String,
    /// File the violation was reported against.
    pub file: String,
}

impl Violation {
    /// Severity with the default policy applied.
    pub fn effective_severity(&self) -> Severity {
        self.severity.unwrap_or(Severity::DEFAULT)
    }

    /// Category with the default policy applied.
    pub fn effective_category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|category| !category.trim().is_empty())
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    /// Rule with the default policy applied.
    pub fn effective_rule(&self) -> &str {
        self.rule
            .as_deref()
            .filter(|rule| !rule.trim().is_empty())
            .unwrap_or(UNKNOWN_RULE)
    }
}

/// Per-file counts derived from a violation list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    /// Counts per category.
    pub by_category: Histogram,
    /// Counts per severity.
    pub by_severity: Histogram,
}

impl FileSummary {
    /// Summarize a violation list.
    pub fn from_violations(violations: &[Violation]) -> Self {
        let mut summary = Self {
            by_category: Histogram::new(),
            by_severity: severity_histogram(),
        };
        for violation in violations {
            *summary
                .by_category
                .entry(violation.effective_category().to_string())
                .or_insert(0) += 1;
            *summary
                .by_severity
                .entry(violation.effective_severity().as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }
}

/// Outcome of analyzing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysisResult {
    /// Path of the analyzed file, relative to the repository root.
    pub path: String,
    /// Violations in checker order.
    pub violations: Vec<Violation>,
    /// Derived counts.
    pub summary: FileSummary,
    /// When the analysis finished.
    pub analyzed_at: DateTime<Utc>,
    /// Set when the analysis could not complete.
    pub error: Option<String>,
}

impl FileAnalysisResult {
    /// Build a completed result.
    pub fn completed(path: impl Into<String>, violations: Vec<Violation>) -> Self {
        let summary = FileSummary::from_violations(&violations);
        Self {
            path: path.into(),
            violations,
            summary,
            analyzed_at: Utc::now(),
            error: None,
        }
    }

    /// Build a failed result.
    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            violations: Vec::new(),
            summary: FileSummary::from_violations(&[]),
            analyzed_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Whether the analysis failed.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Whether at least one violation was reported.
    pub fn has_issues(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Aggregate over a project's file results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatistics {
    /// Number of file results considered.
    pub total_files: usize,
    /// Files with at least one violation.
    pub files_with_issues: usize,
    /// Files whose analysis failed.
    pub failed_files: usize,
    /// Total violations.
    pub total_issues: usize,
    /// Violations per category.
    pub categories: Histogram,
    /// Violations per severity.
    pub severities: Histogram,
    /// Violations per rule.
    pub issue_types: Histogram,
}

impl Default for ProjectStatistics {
    fn default() -> Self {
        Self {
            total_files: 0,
            files_with_issues: 0,
            failed_files: 0,
            total_issues: 0,
            categories: Histogram::new(),
            severities: severity_histogram(),
            issue_types: Histogram::new(),
        }
    }
}

impl ProjectStatistics {
    /// Whether any file in the project reported a violation.
    pub fn has_issues(&self) -> bool {
        self.files_with_issues > 0
    }
}

/// Tri-state population membership result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Member of the population; carries the declared dependency version.
    Valid {
        /// Version string declared in the manifest.
        version: String,
    },
    /// Not a member of the population.
    Invalid {
        /// Why membership was rejected.
        reason: String,
    },
    /// Membership could not be decided.
    Indeterminate {
        /// Underlying failure.
        reason: String,
    },
}

impl ValidationOutcome {
    /// Whether the record belongs to the population.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Human-readable explanation.
    pub fn reason(&self) -> String {
        match self {
            Self::Valid { version } => format!("declares version {version}"),
            Self::Invalid { reason } | Self::Indeterminate { reason } => reason.clone(),
        }
    }
}

/// A file listed in a repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// Histogram seeded with every severity at zero.
pub fn severity_histogram() -> Histogram {
    Severity::ALL
        .iter()
        .map(|severity| (severity.as_str().to_string(), 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Option<Severity>, category: Option<&str>) -> Violation {
        Violation {
            severity,
            category: category.map(str::to_string),
            rule: None,
            line: Some(1),
            column: Some(1),
            message: "arrow functions are not supported".to_string(),
            file: "src/app.js".to_string(),
        }
    }

    #[test]
    fn severity_labels_round_trip() {
        for severity in Severity::ALL {
            assert_eq!(Severity::from_label(severity.as_str()), Some(severity));
        }
        assert_eq!(Severity::from_label("WARN"), Some(Severity::Warning));
        assert_eq!(Severity::from_label("critical"), None);
    }

    #[test]
    fn missing_fields_use_default_policy() {
        let bare = violation(None, None);
        assert_eq!(bare.effective_severity(), Severity::Info);
        assert_eq!(bare.effective_category(), "unknown");
        assert_eq!(bare.effective_rule(), "unknown");

        let blank = violation(Some(Severity::Error), Some("  "));
        assert_eq!(blank.effective_category(), "unknown");
    }

    #[test]
    fn violation_deserializes_without_severity() {
        let parsed: Violation =
            serde_json::from_str(r#"{"message":"let","file":"a.js"}"#).expect("parse");
        assert_eq!(parsed.severity, None);
        assert_eq!(parsed.effective_severity(), Severity::Info);
    }

    #[test]
    fn file_summary_seeds_every_severity() {
        let summary = FileSummary::from_violations(&[violation(
            Some(Severity::Error),
            Some("javascript"),
        )]);
        assert_eq!(summary.by_severity.get("error"), Some(&1));
        assert_eq!(summary.by_severity.get("warning"), Some(&0));
        assert_eq!(summary.by_severity.get("info"), Some(&0));
        assert_eq!(summary.by_category.get("javascript"), Some(&1));
    }

    #[test]
    fn failed_result_is_not_an_issue() {
        let result = FileAnalysisResult::failed("src/app.js", "checker timed out");
        assert!(result.is_failure());
        assert!(!result.has_issues());
    }

    #[test]
    fn validation_outcome_serializes_tagged() {
        let outcome = ValidationOutcome::Indeterminate {
            reason: "unparseable manifest".to_string(),
        };
        let json = serde_json::to_value(&outcome).expect("json");
        assert_eq!(json["outcome"], "indeterminate");
        assert_eq!(json["reason"], "unparseable manifest");
    }
}
