#![deny(missing_docs)]
//! Syntaxcensus core library.
//!
//! This crate contains the sampling, analysis, and estimation pipeline behind
//! the syntaxcensus survey: candidate selection, bounded per-file checking,
//! and population statistics with confidence intervals.

pub mod aggregate;
pub mod checker;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs;
pub mod inspector;
pub mod population;
pub mod project;
pub mod report;
pub mod runner;
pub mod selector;
pub mod source;
pub mod stats;
pub mod throttle;
pub mod validator;

pub use aggregate::aggregate_files;
pub use checker::{CommandChecker, CompatibilityChecker, normalize_output};
pub use config::{
    AnalysisConfig, CheckerConfig, DiscoveryConfig, PopulationCriteria, ReportConfig, SurveyConfig,
};
pub use domain::{
    FileAnalysisResult, FileEntry, ProjectStatistics, RepositoryRecord, Severity,
    ValidationOutcome, Violation,
};
pub use error::{CensusError, Result, SourceError};
pub use fs::{FileSystem, LocalContent, StdFileSystem};
pub use inspector::FileInspector;
pub use population::{PopulationReport, RankedCount, aggregate_population};
pub use project::{AnalysisRun, ProjectAnalysis, ProjectAnalyzer, ProjectFailure, analyze_sample};
pub use report::{
    SurveyReport, render_json, render_markdown, render_yaml, write_projects_csv,
    write_violations_csv,
};
pub use runner::{TaskOutcome, run_bounded};
pub use selector::{Discovery, SelectionOutcome, SelectionSummary, discover_all, select};
pub use source::{BoxFuture, ContentSource, DiscoverySource, SourceResult};
pub use stats::{ConfidenceInterval, interval, required_sample_size, wilson_interval, z_score};
pub use throttle::Throttle;
pub use validator::{ProjectValidator, classify_manifest};
