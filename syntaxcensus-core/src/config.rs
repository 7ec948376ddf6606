//! Survey configuration loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RepositoryRecord;
use crate::error::{CensusError, Result};
use crate::population::DEFAULT_TOP_N;
use crate::stats::required_sample_size;

/// Placeholder replaced with the analyzed file path in checker arguments.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Placeholder replaced with the project directory in checker arguments.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Population membership and sampling parameters. Fixed for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PopulationCriteria {
    /// Minimum star count (inclusive).
    pub min_stars: u64,
    /// Minimum fork count (inclusive).
    pub min_forks: u64,
    /// Earliest accepted creation date (inclusive).
    pub created_after: Option<NaiveDate>,
    /// Explicit sample size; derived from the statistical targets when absent.
    pub sample_size: Option<usize>,
    /// Confidence level in `(0, 1)`.
    pub confidence_level: f64,
    /// Margin of error in `(0, 1)`.
    pub margin_of_error: f64,
}

impl Default for PopulationCriteria {
    fn default() -> Self {
        Self {
            min_stars: 100,
            min_forks: 10,
            created_after: None,
            sample_size: None,
            confidence_level: 0.95,
            margin_of_error: 0.05,
        }
    }
}

impl PopulationCriteria {
    /// Sample size required by the statistical targets.
    pub fn required_sample_size(&self) -> Result<usize> {
        required_sample_size(self.confidence_level, self.margin_of_error)
    }

    /// Target sample size: explicit when configured, otherwise required.
    pub fn target_sample_size(&self) -> Result<usize> {
        match self.sample_size {
            Some(size) => Ok(size),
            None => self.required_sample_size(),
        }
    }

    /// Whether a record passes the popularity and date filters.
    pub fn admits(&self, record: &RepositoryRecord) -> bool {
        record.stars >= self.min_stars
            && record.forks >= self.min_forks
            && self
                .created_after_instant()
                .is_none_or(|bound| record.created_at >= bound)
    }

    fn created_after_instant(&self) -> Option<DateTime<Utc>> {
        self.created_after
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }

    /// Fail fast on values that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        self.required_sample_size()?;
        if self.sample_size == Some(0) {
            return Err(CensusError::Config(
                "sample_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Discovery and validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DiscoveryConfig {
    /// One search query per discovery strategy.
    pub queries: Vec<String>,
    /// Results per page (1..=100).
    pub per_page: u32,
    /// Maximum pages fetched per query.
    pub max_pages: u32,
    /// Fixed delay between API calls.
    pub request_delay_ms: u64,
    /// Dependency that defines population membership.
    pub target_dependency: String,
    /// Manifest declaring the dependency.
    pub manifest_path: String,
    /// API base URL.
    pub api_url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            queries: vec![
                "react in:name,description language:JavaScript".to_string(),
                "react in:name,description language:TypeScript".to_string(),
                "topic:react".to_string(),
            ],
            per_page: 100,
            max_pages: 3,
            request_delay_ms: 1000,
            target_dependency: "react".to_string(),
            manifest_path: "package.json".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Delay between consecutive API calls.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// External checker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CheckerConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments for per-file mode; content is piped on stdin.
    pub args: Vec<String>,
    /// Arguments for directory mode.
    pub directory_args: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: [
                "--yes",
                "eslint",
                "--format",
                "json",
                "--stdin",
                "--stdin-filename",
                PATH_PLACEHOLDER,
            ]
            .map(str::to_string)
            .to_vec(),
            directory_args: ["--yes", "eslint", "--format", "json", DIR_PLACEHOLDER]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

/// File selection and scheduling for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// Concurrent checker invocations per project.
    pub concurrency: usize,
    /// Projects analyzed concurrently.
    pub project_concurrency: usize,
    /// Timeout for one checker invocation.
    pub timeout_secs: u64,
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    /// Files analyzed per project at most.
    pub max_files: usize,
    /// Extensions eligible for analysis, without the dot.
    pub extensions: Vec<String>,
    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,
    /// Checker command.
    pub checker: CheckerConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            project_concurrency: 2,
            timeout_secs: 30,
            max_file_size: 512 * 1024,
            max_files: 200,
            extensions: ["js", "jsx", "mjs", "cjs", "ts", "tsx"]
                .map(str::to_string)
                .to_vec(),
            exclude_dirs: ["node_modules", "dist", "build", "vendor", "coverage"]
                .map(str::to_string)
                .to_vec(),
            checker: CheckerConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Timeout for one checker invocation.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReportConfig {
    /// Entries listed as top issues.
    pub top_n: usize,
    /// Directory receiving stage artifacts.
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            output_dir: PathBuf::from("census-output"),
        }
    }
}

/// Complete survey configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SurveyConfig {
    /// Population criteria.
    pub criteria: PopulationCriteria,
    /// Discovery settings.
    pub discovery: DiscoveryConfig,
    /// Analysis settings.
    pub analysis: AnalysisConfig,
    /// Report settings.
    pub report: ReportConfig,
}

impl SurveyConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from a file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                log::debug!("loaded configuration from {}", path.display());
                Self::from_toml(&contents)
            }
            None => Ok(Self::default()),
        }
    }

    /// Check every setting; returns the first configuration error.
    pub fn validate(&self) -> Result<()> {
        self.criteria.validate()?;

        let discovery = &self.discovery;
        if discovery.queries.iter().all(|query| query.trim().is_empty()) {
            return config_error("at least one discovery query is required");
        }
        if !(1..=100).contains(&discovery.per_page) {
            return config_error("per_page must be between 1 and 100");
        }
        if discovery.max_pages == 0 {
            return config_error("max_pages must be at least 1");
        }
        if discovery.target_dependency.trim().is_empty() {
            return config_error("target_dependency cannot be empty");
        }
        if discovery.manifest_path.trim().is_empty() {
            return config_error("manifest_path cannot be empty");
        }

        let analysis = &self.analysis;
        if analysis.concurrency == 0 || analysis.project_concurrency == 0 {
            return config_error("concurrency must be at least 1");
        }
        if analysis.timeout_secs == 0 {
            return config_error("timeout_secs must be at least 1");
        }
        if analysis.max_files == 0 {
            return config_error("max_files must be at least 1");
        }
        if analysis.extensions.is_empty() {
            return config_error("at least one file extension is required");
        }
        if analysis.checker.program.trim().is_empty() {
            return config_error("checker program cannot be empty");
        }

        if self.report.top_n == 0 {
            return config_error("top_n must be at least 1");
        }
        Ok(())
    }
}

fn config_error<T>(message: &str) -> Result<T> {
    Err(CensusError::Config(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(stars: u64, forks: u64, created: (i32, u32, u32)) -> RepositoryRecord {
        RepositoryRecord {
            full_name: "acme/widget".to_string(),
            stars,
            forks,
            created_at: Utc
                .with_ymd_and_hms(created.0, created.1, created.2, 0, 0, 0)
                .unwrap(),
            language: Some("JavaScript".to_string()),
            description: None,
            clone_url: "https://github.com/acme/widget.git".to_string(),
            default_branch: "main".to_string(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        SurveyConfig::default().validate().expect("valid defaults");
    }

    #[test]
    fn report_defaults_to_standard_top_n() {
        assert_eq!(ReportConfig::default().top_n, DEFAULT_TOP_N);
    }

    #[test]
    fn target_sample_size_prefers_explicit_value() {
        let mut criteria = PopulationCriteria::default();
        assert_eq!(criteria.target_sample_size().expect("size"), 385);
        criteria.sample_size = Some(10);
        assert_eq!(criteria.target_sample_size().expect("size"), 10);
    }

    #[test]
    fn criteria_admit_by_popularity_and_date() {
        let criteria = PopulationCriteria {
            min_stars: 100,
            min_forks: 10,
            created_after: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..PopulationCriteria::default()
        };
        assert!(criteria.admits(&record(500, 50, (2021, 1, 1))));
        assert!(criteria.admits(&record(100, 10, (2020, 1, 1))));
        assert!(!criteria.admits(&record(99, 50, (2021, 1, 1))));
        assert!(!criteria.admits(&record(500, 9, (2021, 1, 1))));
        assert!(!criteria.admits(&record(500, 50, (2019, 12, 31))));
    }

    #[test]
    fn zero_thresholds_are_valid() {
        let mut config = SurveyConfig::default();
        config.criteria.min_stars = 0;
        config.criteria.min_forks = 0;
        config.validate().expect("zero thresholds accepted");
        assert!(config.criteria.admits(&record(0, 0, (2010, 1, 1))));
    }

    #[test]
    fn validate_rejects_bad_statistics() {
        let mut config = SurveyConfig::default();
        config.criteria.confidence_level = 1.0;
        assert!(matches!(config.validate(), Err(CensusError::Config(_))));

        let mut config = SurveyConfig::default();
        config.criteria.margin_of_error = 0.0;
        assert!(matches!(config.validate(), Err(CensusError::Config(_))));

        let mut config = SurveyConfig::default();
        config.criteria.sample_size = Some(0);
        assert!(matches!(config.validate(), Err(CensusError::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_scheduling() {
        let mut config = SurveyConfig::default();
        config.analysis.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrency"));

        let mut config = SurveyConfig::default();
        config.discovery.queries = vec!["  ".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("discovery query"));
    }

    #[test]
    fn parses_partial_toml() {
        let config = SurveyConfig::from_toml(
            r#"
            [criteria]
            min_stars = 250
            created_after = "2020-01-01"

            [analysis]
            concurrency = 3

            [analysis.checker]
            program = "es-check"
            args = ["es5", "{path}"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.criteria.min_stars, 250);
        assert_eq!(config.criteria.min_forks, 10);
        assert_eq!(
            config.criteria.created_after,
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(config.analysis.concurrency, 3);
        assert_eq!(config.analysis.checker.program, "es-check");
        assert_eq!(config.analysis.timeout_secs, 30);
        assert_eq!(config.discovery.target_dependency, "react");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("census.toml");
        std::fs::write(&path, "[report]\ntop_n = 5\n").expect("write config");
        let config = SurveyConfig::load(Some(&path)).expect("load");
        assert_eq!(config.report.top_n, 5);
        assert_eq!(SurveyConfig::load(None).expect("defaults"), SurveyConfig::default());
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = SurveyConfig::from_toml("[criteria\nmin_stars = 1").unwrap_err();
        assert!(matches!(err, CensusError::Toml(_)));
    }
}
