//! Project analysis: file retrieval, per-file checking, and project-level runs.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate_files;
use crate::checker::CompatibilityChecker;
use crate::config::AnalysisConfig;
use crate::domain::{FileAnalysisResult, FileEntry, ProjectStatistics, RepositoryRecord, Violation};
use crate::error::{CensusError, Result, SourceError};
use crate::inspector::FileInspector;
use crate::population::{PopulationReport, aggregate_population};
use crate::runner::run_bounded;
use crate::selector::SelectionSummary;
use crate::source::ContentSource;

/// A project analyzed to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    /// Analyzed repository.
    pub record: RepositoryRecord,
    /// File results sorted by path.
    pub files: Vec<FileAnalysisResult>,
    /// Reduction of `files`.
    pub statistics: ProjectStatistics,
    /// Eligible files left out by the per-project cap.
    pub skipped_files: usize,
}

/// A sample unit that could not be analyzed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFailure {
    /// Repository that failed.
    pub record: RepositoryRecord,
    /// Why it failed.
    pub reason: String,
}

/// Result of analyzing one sampled project.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectOutcome {
    /// Analysis completed.
    Analyzed(ProjectAnalysis),
    /// Hard failure.
    Failed(ProjectFailure),
}

/// Every project outcome of one analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    /// Selection accounting carried over from discovery, when known.
    #[serde(default)]
    pub selection: Option<SelectionSummary>,
    /// Analyzed projects, sorted by identity.
    pub projects: Vec<ProjectAnalysis>,
    /// Hard failures, sorted by identity.
    pub failures: Vec<ProjectFailure>,
}

impl AnalysisRun {
    /// Statistics of every analyzed project.
    pub fn statistics(&self) -> Vec<ProjectStatistics> {
        self.projects
            .iter()
            .map(|project| project.statistics.clone())
            .collect()
    }

    /// Population report over this run.
    pub fn population(&self, confidence_level: f64, top_n: usize) -> Result<PopulationReport> {
        aggregate_population(
            &self.statistics(),
            self.failures.len(),
            confidence_level,
            top_n,
        )
    }
}

/// Analyzes sampled projects with a content source and a checker.
pub struct ProjectAnalyzer {
    content: Arc<dyn ContentSource>,
    checker: Arc<dyn CompatibilityChecker>,
    inspector: FileInspector,
    concurrency: usize,
    checkout_root: Option<PathBuf>,
}

enum FileTask {
    Checked(FileAnalysisResult),
    Unfetchable(String),
    Critical(String),
}

impl ProjectAnalyzer {
    /// Per-file analyzer: content is fetched and checked one file at a time.
    pub fn new(
        content: Arc<dyn ContentSource>,
        checker: Arc<dyn CompatibilityChecker>,
        analysis: &AnalysisConfig,
    ) -> Self {
        Self {
            content,
            checker,
            inspector: FileInspector::new(analysis),
            concurrency: analysis.concurrency,
            checkout_root: None,
        }
    }

    /// Check whole checkouts stored as `<root>/<full_name>` in one checker call.
    pub fn with_checkouts(mut self, root: impl Into<PathBuf>) -> Self {
        self.checkout_root = Some(root.into());
        self
    }

    /// Analyze one project. Only critical errors are returned as `Err`.
    pub async fn analyze(&self, record: &RepositoryRecord) -> Result<ProjectOutcome> {
        let tree = match self.content.fetch_file_tree(record).await {
            Ok(tree) => tree,
            Err(err) if err.is_critical() => return Err(CensusError::Critical(err.to_string())),
            Err(err) => return Ok(failure(record, tree_failure(&err))),
        };

        let (selected, skipped) = self.inspector.select(&tree);
        if selected.is_empty() {
            return Ok(failure(record, "no eligible files"));
        }
        if skipped > 0 {
            log::debug!(
                "{}: analyzing {} files, {skipped} over the cap",
                record.full_name,
                selected.len()
            );
        }

        let files = match &self.checkout_root {
            Some(root) => {
                let dir = match tokio::fs::canonicalize(root.join(&record.full_name)).await {
                    Ok(dir) => dir,
                    Err(err) => return Ok(failure(record, format!("checkout unavailable: {err}"))),
                };
                match self.check_checkout(&dir, &selected).await {
                    Ok(files) => files,
                    Err(err) => return Ok(failure(record, err.to_string())),
                }
            }
            None => self.check_files(record, selected).await?,
        };

        if files.is_empty() {
            return Ok(failure(record, "no fetchable files"));
        }

        let statistics = aggregate_files(&files);
        if statistics.failed_files == statistics.total_files {
            return Ok(failure(record, "every file failed analysis"));
        }
        log::info!(
            "{}: {} files, {} issues, {} failed",
            record.full_name,
            statistics.total_files,
            statistics.total_issues,
            statistics.failed_files
        );
        Ok(ProjectOutcome::Analyzed(ProjectAnalysis {
            record: record.clone(),
            files,
            statistics,
            skipped_files: skipped,
        }))
    }

    async fn check_files(
        &self,
        record: &RepositoryRecord,
        selected: Vec<FileEntry>,
    ) -> Result<Vec<FileAnalysisResult>> {
        let tasks = selected
            .into_iter()
            .map(|entry| {
                let content = Arc::clone(&self.content);
                let checker = Arc::clone(&self.checker);
                let record = record.clone();
                let path = entry.path.clone();
                let task = async move {
                    let outcome = match content.fetch_file_content(&record, &path).await {
                        Ok(Some(text)) => match checker.check_content(&path, &text).await {
                            Ok(violations) => FileTask::Checked(FileAnalysisResult::completed(
                                path.as_str(),
                                violations,
                            )),
                            Err(err) => {
                                log::warn!("{}: {path}: {err}", record.full_name);
                                FileTask::Checked(FileAnalysisResult::failed(
                                    path.as_str(),
                                    err.to_string(),
                                ))
                            }
                        },
                        Ok(None) => FileTask::Unfetchable("no content".to_string()),
                        Err(err) if err.is_critical() => FileTask::Critical(err.to_string()),
                        Err(err) => FileTask::Unfetchable(err.to_string()),
                    };
                    Ok::<_, Infallible>(outcome)
                };
                (entry.path, task)
            })
            .collect();

        let mut files = Vec::new();
        for outcome in run_bounded(tasks, self.concurrency).await {
            match outcome.result {
                Ok(FileTask::Checked(result)) => files.push(result),
                Ok(FileTask::Unfetchable(reason)) => {
                    log::debug!("{}: skipping {}: {reason}", record.full_name, outcome.id);
                }
                Ok(FileTask::Critical(reason)) => return Err(CensusError::Critical(reason)),
                Err(message) => files.push(FileAnalysisResult::failed(outcome.id, message)),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn check_checkout(
        &self,
        dir: &Path,
        selected: &[FileEntry],
    ) -> Result<Vec<FileAnalysisResult>> {
        let violations = self.checker.check_directory(dir).await?;
        Ok(group_by_file(selected, violations))
    }
}

/// One result per selected file. Violations in other files are dropped.
pub fn group_by_file(selected: &[FileEntry], violations: Vec<Violation>) -> Vec<FileAnalysisResult> {
    let mut grouped: BTreeMap<String, Vec<Violation>> = selected
        .iter()
        .map(|entry| (entry.path.clone(), Vec::new()))
        .collect();
    let mut unselected: BTreeMap<String, usize> = BTreeMap::new();
    for violation in violations {
        match grouped.get_mut(&violation.file) {
            Some(file) => file.push(violation),
            None => *unselected.entry(violation.file).or_insert(0) += 1,
        }
    }
    for (path, count) in &unselected {
        log::debug!("ignoring {count} violations in unselected file {path}");
    }
    grouped
        .into_iter()
        .map(|(path, violations)| FileAnalysisResult::completed(path, violations))
        .collect()
}

/// Analyze every sampled project with at most `project_concurrency` in flight.
///
/// Hard failures are collected; a critical error stops the run.
pub async fn analyze_sample(
    analyzer: Arc<ProjectAnalyzer>,
    sample: &[RepositoryRecord],
    project_concurrency: usize,
) -> Result<AnalysisRun> {
    log::info!(
        "analyzing {} projects, {project_concurrency} at a time",
        sample.len()
    );
    let records: BTreeMap<String, RepositoryRecord> = sample
        .iter()
        .map(|record| (record.full_name.clone(), record.clone()))
        .collect();
    let tasks = sample
        .iter()
        .map(|record| {
            let analyzer = Arc::clone(&analyzer);
            let record = record.clone();
            let id = record.full_name.clone();
            (id, async move { Ok::<_, Infallible>(analyzer.analyze(&record).await) })
        })
        .collect();

    let mut run = AnalysisRun::default();
    for outcome in run_bounded(tasks, project_concurrency).await {
        match outcome.result {
            Ok(Ok(ProjectOutcome::Analyzed(analysis))) => run.projects.push(analysis),
            Ok(Ok(ProjectOutcome::Failed(failed))) => run.failures.push(failed),
            Ok(Err(err)) => return Err(err),
            Err(message) => {
                if let Some(record) = records.get(&outcome.id) {
                    run.failures.push(ProjectFailure {
                        record: record.clone(),
                        reason: message,
                    });
                }
            }
        }
    }

    for failed in &run.failures {
        log::warn!("{} could not be analyzed: {}", failed.record.full_name, failed.reason);
    }
    run.projects
        .sort_by(|a, b| a.record.full_name.cmp(&b.record.full_name));
    run.failures
        .sort_by(|a, b| a.record.full_name.cmp(&b.record.full_name));
    log::info!(
        "analysis finished: {} analyzed, {} failed",
        run.projects.len(),
        run.failures.len()
    );
    Ok(run)
}

fn failure(record: &RepositoryRecord, reason: impl Into<String>) -> ProjectOutcome {
    ProjectOutcome::Failed(ProjectFailure {
        record: record.clone(),
        reason: reason.into(),
    })
}

fn tree_failure(err: &SourceError) -> String {
    match err {
        SourceError::NotFound => "repository inaccessible".to_string(),
        other => format!("file tree unavailable: {other}"),
    }
}
