//! Report assembly and rendering for survey outputs.

use std::fmt::Write;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PopulationCriteria;
use crate::error::Result;
use crate::population::{PopulationReport, RankedCount};
use crate::project::{AnalysisRun, ProjectAnalysis, ProjectFailure};
use crate::selector::SelectionSummary;

/// Whether a sampled project was analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Analysis completed.
    Analyzed,
    /// Hard failure with its reason.
    Failed(String),
}

/// One row of the per-project table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRow {
    /// Repository identity.
    pub full_name: String,
    /// Star count.
    pub stars: u64,
    /// Fork count.
    pub forks: u64,
    /// Analysis status.
    pub status: ProjectStatus,
    /// Files analyzed.
    pub total_files: usize,
    /// Files with at least one violation.
    pub files_with_issues: usize,
    /// Files whose analysis failed.
    pub failed_files: usize,
    /// Violations found.
    pub total_issues: usize,
    /// Categories with at least one violation.
    pub categories: Vec<String>,
    /// Whether the project has any violation.
    pub has_issues: bool,
}

impl ProjectRow {
    fn analyzed(project: &ProjectAnalysis) -> Self {
        let stats = &project.statistics;
        Self {
            full_name: project.record.full_name.clone(),
            stars: project.record.stars,
            forks: project.record.forks,
            status: ProjectStatus::Analyzed,
            total_files: stats.total_files,
            files_with_issues: stats.files_with_issues,
            failed_files: stats.failed_files,
            total_issues: stats.total_issues,
            categories: stats
                .categories
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(category, _)| category.clone())
                .collect(),
            has_issues: stats.has_issues(),
        }
    }

    fn failed(failure: &ProjectFailure) -> Self {
        Self {
            full_name: failure.record.full_name.clone(),
            stars: failure.record.stars,
            forks: failure.record.forks,
            status: ProjectStatus::Failed(failure.reason.clone()),
            total_files: 0,
            files_with_issues: 0,
            failed_files: 0,
            total_issues: 0,
            categories: Vec::new(),
            has_issues: false,
        }
    }
}

/// Complete survey report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyReport {
    /// When the report was assembled.
    pub generated_at: DateTime<Utc>,
    /// Criteria the sample was drawn with.
    pub criteria: PopulationCriteria,
    /// Selection accounting, when the sample came from discovery.
    pub selection: Option<SelectionSummary>,
    /// Population statistics.
    pub population: PopulationReport,
    /// One row per sampled project, sorted by identity.
    pub projects: Vec<ProjectRow>,
}

impl SurveyReport {
    /// Assemble the report for an analysis run.
    pub fn build(run: &AnalysisRun, criteria: &PopulationCriteria, top_n: usize) -> Result<Self> {
        let population = run.population(criteria.confidence_level, top_n)?;
        let mut projects: Vec<ProjectRow> = run
            .projects
            .iter()
            .map(ProjectRow::analyzed)
            .chain(run.failures.iter().map(ProjectRow::failed))
            .collect();
        projects.sort_by(|a, b| a.full_name.cmp(&b.full_name));

        Ok(Self {
            generated_at: Utc::now(),
            criteria: criteria.clone(),
            selection: run.selection.clone(),
            population,
            projects,
        })
    }
}

/// Render any serializable report payload as JSON.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

/// Render any serializable report payload as YAML.
pub fn render_yaml<T: Serialize + ?Sized>(payload: &T) -> std::result::Result<String, serde_yaml::Error> {
    serde_yaml::to_string(payload)
}

/// Render the survey report as Markdown.
pub fn render_markdown(report: &SurveyReport) -> String {
    let population = &report.population;
    let mut output = String::new();
    let _ = writeln!(output, "# Syntax Census Report\n");
    let _ = writeln!(
        output,
        "Generated {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let _ = writeln!(output, "## Overview\n");
    let _ = writeln!(output, "- Sampled projects: {}", population.total_candidates);
    let _ = writeln!(output, "- Analyzed: {}", population.analyzed_projects);
    let _ = writeln!(output, "- Failed: {}", population.failed_projects);
    let _ = writeln!(output, "- With issues: {}", population.projects_with_issues);
    let _ = writeln!(output, "- Without issues: {}", population.projects_without_issues);
    let _ = writeln!(output, "- Files analyzed: {}", population.total_files);
    let _ = writeln!(output, "- Issues found: {}", population.total_issues);
    let _ = writeln!(
        output,
        "- Issues per project: {:.2}",
        population.average_issues_per_project
    );
    let _ = writeln!(output, "- Issues per file: {:.2}\n", population.average_issues_per_file);

    append_prevalence(&mut output, population);
    if let Some(selection) = &report.selection {
        append_selection(&mut output, selection);
    }
    append_ranked(&mut output, "Categories", &population.categories);
    append_ranked(&mut output, "Severities", &population.severities);
    append_ranked(&mut output, "Top issues", &population.top_issues);
    append_failures(&mut output, &report.projects);
    output
}

fn append_prevalence(output: &mut String, population: &PopulationReport) {
    let interval = &population.prevalence;
    let _ = writeln!(output, "## Prevalence\n");
    let _ = writeln!(
        output,
        "{:.2}% of sampled projects have at least one issue ({:.0}% CI {:.2}% to {:.2}%, margin {:.2}%).",
        interval.estimate,
        population.confidence_level * 100.0,
        interval.lower,
        interval.upper,
        interval.margin
    );
    let _ = writeln!(
        output,
        "Computed over {} projects, of which {} failed analysis and count as issue-free.\n",
        population.total_candidates, population.failed_projects
    );
}

fn append_selection(output: &mut String, selection: &SelectionSummary) {
    let _ = writeln!(output, "## Selection\n");
    let _ = writeln!(output, "- Candidates found: {}", selection.total_found);
    let _ = writeln!(output, "- Valid: {}", selection.total_valid);
    let _ = writeln!(output, "- Invalid: {}", selection.total_invalid);
    let _ = writeln!(output, "- Indeterminate: {}", selection.indeterminate.len());
    let _ = writeln!(output, "- Filtered out: {}", selection.filtered_out);
    let _ = writeln!(
        output,
        "- Sampled: {} (required {})",
        selection.sampled, selection.required_sample_size
    );
    for warning in &selection.warnings {
        let _ = writeln!(output, "- Warning: {warning}");
    }
    let _ = writeln!(output);
}

fn append_ranked(output: &mut String, title: &str, entries: &[RankedCount]) {
    let entries: Vec<&RankedCount> = entries.iter().filter(|entry| entry.count > 0).collect();
    if entries.is_empty() {
        let _ = writeln!(output, "## {title}\nNone recorded.\n");
        return;
    }
    let _ = writeln!(output, "## {title}\n");
    let _ = writeln!(output, "| Key | Count | Share |");
    let _ = writeln!(output, "|---|---:|---:|");
    for entry in entries {
        let _ = writeln!(
            output,
            "| {} | {} | {:.2}% |",
            entry.key, entry.count, entry.percentage
        );
    }
    let _ = writeln!(output);
}

fn append_failures(output: &mut String, rows: &[ProjectRow]) {
    let failures: Vec<(&str, &str)> = rows
        .iter()
        .filter_map(|row| match &row.status {
            ProjectStatus::Failed(reason) => Some((row.full_name.as_str(), reason.as_str())),
            ProjectStatus::Analyzed => None,
        })
        .collect();
    if failures.is_empty() {
        return;
    }
    let _ = writeln!(output, "## Failed projects\n");
    for (name, reason) in failures {
        let _ = writeln!(output, "- {name}: {reason}");
    }
    let _ = writeln!(output);
}

/// Write one CSV row per sampled project.
pub fn write_projects_csv<W: io::Write>(out: W, report: &SurveyReport) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(out);
    wtr.write_record([
        "full_name",
        "stars",
        "forks",
        "status",
        "total_files",
        "files_with_issues",
        "failed_files",
        "total_issues",
        "categories",
        "has_issues",
    ])?;

    for row in &report.projects {
        wtr.write_record([
            row.full_name.clone(),
            row.stars.to_string(),
            row.forks.to_string(),
            match &row.status {
                ProjectStatus::Analyzed => "analyzed".to_string(),
                ProjectStatus::Failed(_) => "failed".to_string(),
            },
            row.total_files.to_string(),
            row.files_with_issues.to_string(),
            row.failed_files.to_string(),
            row.total_issues.to_string(),
            row.categories.join(";"),
            row.has_issues.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write one CSV row per violation across analyzed projects.
pub fn write_violations_csv<W: io::Write>(out: W, run: &AnalysisRun) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(out);
    wtr.write_record([
        "project", "file", "rule", "category", "severity", "message", "line", "column",
    ])?;

    for project in &run.projects {
        for file in &project.files {
            for violation in &file.violations {
                wtr.write_record([
                    project.record.full_name.clone(),
                    file.path.clone(),
                    violation.effective_rule().to_string(),
                    violation.effective_category().to_string(),
                    violation.effective_severity().to_string(),
                    violation.message.clone(),
                    violation.line.map(|line| line.to_string()).unwrap_or_default(),
                    violation.column.map(|col| col.to_string()).unwrap_or_default(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_files;
    use crate::domain::{FileAnalysisResult, RepositoryRecord, Severity, Violation};
    use chrono::TimeZone;

    fn record(name: &str, stars: u64) -> RepositoryRecord {
        RepositoryRecord {
            full_name: name.to_string(),
            stars,
            forks: 20,
            created_at: Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap(),
            language: Some("TypeScript".to_string()),
            description: Some("storefront".to_string()),
            clone_url: format!("https://github.com/{name}.git"),
            default_branch: "main".to_string(),
        }
    }

    fn violation(file: &str) -> Violation {
        Violation {
            severity: Some(Severity::Error),
            category: Some("typescript".to_string()),
            rule: Some("es-x/no-class-fields".to_string()),
            line: Some(4),
            column: Some(2),
            message: "Class fields, are not supported".to_string(),
            file: file.to_string(),
        }
    }

    fn sample_run() -> AnalysisRun {
        let files = vec![
            FileAnalysisResult::completed("src/a.ts", vec![violation("src/a.ts")]),
            FileAnalysisResult::completed("src/b.ts", Vec::new()),
        ];
        let statistics = aggregate_files(&files);
        AnalysisRun {
            selection: Some(SelectionSummary {
                total_found: 12,
                total_valid: 8,
                total_invalid: 3,
                sampled: 2,
                required_sample_size: 385,
                ..SelectionSummary::default()
            }),
            projects: vec![ProjectAnalysis {
                record: record("acme/shop", 900),
                files,
                statistics,
                skipped_files: 0,
            }],
            failures: vec![ProjectFailure {
                record: record("acme/gone", 300),
                reason: "repository inaccessible".to_string(),
            }],
        }
    }

    fn sample_report() -> SurveyReport {
        SurveyReport::build(&sample_run(), &PopulationCriteria::default(), 10).expect("report")
    }

    #[test]
    fn builds_rows_for_analyzed_and_failed_projects() {
        let report = sample_report();
        assert_eq!(report.projects.len(), 2);
        assert_eq!(report.projects[0].full_name, "acme/gone");
        assert_eq!(
            report.projects[0].status,
            ProjectStatus::Failed("repository inaccessible".to_string())
        );
        assert_eq!(report.projects[1].categories, vec!["typescript".to_string()]);
        assert!(report.projects[1].has_issues);
        assert_eq!(report.population.total_candidates, 2);
        assert_eq!(report.population.prevalence.estimate, 50.0);
    }

    #[test]
    fn markdown_discloses_failures_next_to_prevalence() {
        let output = render_markdown(&sample_report());
        assert!(output.contains("# Syntax Census Report"));
        assert!(output.contains("50.00% of sampled projects"));
        assert!(output.contains("of which 1 failed analysis"));
        assert!(output.contains("- Indeterminate: 0"));
        assert!(output.contains("| es-x/no-class-fields | 1 | 100.00% |"));
        assert!(output.contains("- acme/gone: repository inaccessible"));
    }

    #[test]
    fn renders_structured_payloads() {
        let report = sample_report();
        let json = render_json(&report).expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed["population"]["analyzedProjects"], 1);
        assert_eq!(parsed["projects"][0]["status"]["status"], "failed");

        let yaml = render_yaml(&report).expect("yaml");
        let back: SurveyReport = serde_yaml::from_str(&yaml).expect("yaml parse");
        assert_eq!(back.population, report.population);
    }

    #[test]
    fn writes_project_table() {
        let mut buffer = Vec::new();
        write_projects_csv(&mut buffer, &sample_report()).expect("csv");
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "full_name,stars,forks,status,total_files,files_with_issues,failed_files,total_issues,categories,has_issues"
        );
        assert_eq!(lines[1], "acme/gone,300,20,failed,0,0,0,0,,false");
        assert_eq!(lines[2], "acme/shop,900,20,analyzed,2,1,0,1,typescript,true");
    }

    #[test]
    fn writes_violation_table_with_quoting() {
        let mut buffer = Vec::new();
        write_violations_csv(&mut buffer, &sample_run()).expect("csv");
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "acme/shop,src/a.ts,es-x/no-class-fields,typescript,error,\"Class fields, are not supported\",4,2"
        );
    }
}
