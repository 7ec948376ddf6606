#![deny(missing_docs)]
//! Syntaxcensus command-line interface.
//!
//! Discovers candidate projects, analyzes a validated sample with an external
//! syntax checker, and reports population-level prevalence estimates.

mod github;

use chrono::Utc;
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use github::GitHubClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syntaxcensus_core::{
    AnalysisRun, CommandChecker, ContentSource, DiscoverySource, LocalContent, ProjectAnalyzer,
    ProjectValidator, RepositoryRecord, SelectionOutcome, StdFileSystem, SurveyConfig,
    SurveyReport, analyze_sample, discover_all, render_json, render_markdown, render_yaml, select,
    write_projects_csv, write_violations_csv,
};

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const SAMPLE_FILE: &str = "sample.json";
const ANALYSIS_FILE: &str = "analysis.json";
const REPORT_JSON_FILE: &str = "report.json";
const REPORT_YAML_FILE: &str = "report.yaml";
const REPORT_MARKDOWN_FILE: &str = "report.md";
const PROJECTS_CSV_FILE: &str = "projects.csv";
const VIOLATIONS_CSV_FILE: &str = "violations.csv";

#[derive(Parser)]
#[command(name = "syntaxcensus", version, about = "Syntax compatibility census")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
struct OverrideArgs {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory receiving stage artifacts.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Fixed sample size instead of the statistically required one.
    #[arg(long)]
    sample_size: Option<usize>,
    /// Minimum star count.
    #[arg(long)]
    min_stars: Option<u64>,
    /// Minimum fork count.
    #[arg(long)]
    min_forks: Option<u64>,
    /// Concurrent checker invocations per project.
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// Largest file analyzed, in bytes.
    #[arg(long)]
    max_file_size: Option<u64>,
    /// Files analyzed per project at most.
    #[arg(long)]
    max_files: Option<usize>,
    /// Timeout for one checker invocation, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// GitHub API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Args, Clone, Debug)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(true)
        .args(&["sample", "dir"])
))]
struct AnalyzeSourceArgs {
    /// Sample produced by `discover`.
    #[arg(long)]
    sample: Option<PathBuf>,
    /// Local checkouts: `<dir>/<owner>/<name>` with --sample, `<dir>/<name>` otherwise.
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Check each checkout in one checker call instead of file by file.
    #[arg(long, requires = "dir")]
    whole_project: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, validate, and sample candidate projects.
    Discover {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Analyze a sample from `discover` or a directory of checkouts.
    Analyze {
        #[command(flatten)]
        source: AnalyzeSourceArgs,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Render reports from an analysis run.
    Report {
        /// Analysis produced by `analyze`; defaults to the output directory.
        #[arg(long)]
        analysis: Option<PathBuf>,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Run discovery, analysis, and reporting in one go.
    Run {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Check configuration, credential, and checker availability.
    Validate {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Discover { overrides } => {
            let config = load_config(&overrides)?;
            let client = GitHubClient::new(&config.discovery, require_token(&overrides)?)?;
            let outcome = discover_with(&client, &config).await?;
            write_json(&config, SAMPLE_FILE, &outcome).await?;
        }
        Commands::Analyze { source, overrides } => {
            let config = load_config(&overrides)?;
            let run = run_analyze(&config, &source, overrides.token.clone()).await?;
            write_json(&config, ANALYSIS_FILE, &run).await?;
        }
        Commands::Report {
            analysis,
            overrides,
        } => {
            let config = load_config(&overrides)?;
            let path =
                analysis.unwrap_or_else(|| config.report.output_dir.join(ANALYSIS_FILE));
            let run: AnalysisRun = read_json(&path).await?;
            write_reports(&config, &run).await?;
        }
        Commands::Run { overrides } => {
            let config = load_config(&overrides)?;
            let client = Arc::new(GitHubClient::new(
                &config.discovery,
                require_token(&overrides)?,
            )?);
            let outcome = discover_with(client.as_ref(), &config).await?;
            write_json(&config, SAMPLE_FILE, &outcome).await?;
            let content: Arc<dyn ContentSource> = client;
            let run = analyze_with(&config, content, None, outcome.sample, Some(outcome.summary))
                .await?;
            write_json(&config, ANALYSIS_FILE, &run).await?;
            write_reports(&config, &run).await?;
        }
        Commands::Validate { overrides } => {
            let config = load_config(&overrides)?;
            run_validate(&config, &overrides).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
fn main() {}

#[cfg_attr(test, allow(dead_code))]
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Load the configuration file, apply command-line overrides, and validate.
fn load_config(overrides: &OverrideArgs) -> CliResult<SurveyConfig> {
    let mut config = SurveyConfig::load(overrides.config.as_deref())?;
    apply_overrides(&mut config, overrides);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut SurveyConfig, overrides: &OverrideArgs) {
    if let Some(dir) = &overrides.output_dir {
        config.report.output_dir = dir.clone();
    }
    if let Some(size) = overrides.sample_size {
        config.criteria.sample_size = Some(size);
    }
    if let Some(stars) = overrides.min_stars {
        config.criteria.min_stars = stars;
    }
    if let Some(forks) = overrides.min_forks {
        config.criteria.min_forks = forks;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.analysis.concurrency = concurrency;
    }
    if let Some(size) = overrides.max_file_size {
        config.analysis.max_file_size = size;
    }
    if let Some(files) = overrides.max_files {
        config.analysis.max_files = files;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.analysis.timeout_secs = secs;
    }
}

fn require_token(overrides: &OverrideArgs) -> CliResult<Option<String>> {
    match overrides.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Ok(Some(token.to_string())),
        _ => Err("GITHUB_TOKEN is required for discovery".into()),
    }
}

/// Run every discovery strategy and select the sample.
async fn discover_with<S: DiscoverySource + ?Sized>(
    source: &S,
    config: &SurveyConfig,
) -> CliResult<SelectionOutcome> {
    let discovery = discover_all(source, &config.discovery.queries).await?;
    let validator = ProjectValidator::new(
        source,
        config.discovery.target_dependency.as_str(),
        config.discovery.manifest_path.as_str(),
    );
    let mut outcome = select(discovery.results, &config.criteria, &validator).await?;
    outcome.summary.warnings = discovery.warnings;
    Ok(outcome)
}

async fn run_analyze(
    config: &SurveyConfig,
    source: &AnalyzeSourceArgs,
    token: Option<String>,
) -> CliResult<AnalysisRun> {
    let selection = match &source.sample {
        Some(path) => Some(read_json::<SelectionOutcome>(path).await?),
        None => None,
    };

    match &source.dir {
        Some(dir) => {
            let (sample, summary) = match selection {
                Some(outcome) => (outcome.sample, Some(outcome.summary)),
                None => (local_records(dir).await?, None),
            };
            let content: Arc<dyn ContentSource> =
                Arc::new(LocalContent::new(StdFileSystem::new(), dir.clone()));
            let checkouts = source.whole_project.then(|| dir.clone());
            analyze_with(config, content, checkouts, sample, summary).await
        }
        None => {
            let outcome = selection.ok_or("either --sample or --dir is required")?;
            let client = GitHubClient::new(&config.discovery, token)?;
            if !client.has_token() {
                log::warn!("no GITHUB_TOKEN set; unauthenticated API quota is very low");
            }
            let content: Arc<dyn ContentSource> = Arc::new(client);
            analyze_with(config, content, None, outcome.sample, Some(outcome.summary)).await
        }
    }
}

/// Analyze `sample` with the configured checker.
async fn analyze_with(
    config: &SurveyConfig,
    content: Arc<dyn ContentSource>,
    checkouts: Option<PathBuf>,
    sample: Vec<RepositoryRecord>,
    selection: Option<syntaxcensus_core::SelectionSummary>,
) -> CliResult<AnalysisRun> {
    let analysis = &config.analysis;
    let checker = Arc::new(CommandChecker::new(
        analysis.checker.clone(),
        analysis.timeout(),
    ));
    let mut analyzer = ProjectAnalyzer::new(content, checker, analysis);
    if let Some(root) = checkouts {
        analyzer = analyzer.with_checkouts(root);
    }
    let mut run = analyze_sample(Arc::new(analyzer), &sample, analysis.project_concurrency).await?;
    run.selection = selection;
    Ok(run)
}

/// Records for each non-hidden checkout directory below `dir`.
async fn local_records(dir: &Path) -> CliResult<Vec<RepositoryRecord>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        records.push(RepositoryRecord {
            full_name: name.to_string(),
            stars: 0,
            forks: 0,
            created_at: Utc::now(),
            language: None,
            description: None,
            clone_url: path.display().to_string(),
            default_branch: "HEAD".to_string(),
        });
    }
    records.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(records)
}

/// Write every report artifact for an analysis run.
async fn write_reports(config: &SurveyConfig, run: &AnalysisRun) -> CliResult<SurveyReport> {
    let report = SurveyReport::build(run, &config.criteria, config.report.top_n)?;
    let dir = &config.report.output_dir;
    tokio::fs::create_dir_all(dir).await?;

    tokio::fs::write(dir.join(REPORT_JSON_FILE), render_json(&report)?).await?;
    tokio::fs::write(dir.join(REPORT_YAML_FILE), render_yaml(&report)?).await?;
    let markdown = render_markdown(&report);
    tokio::fs::write(dir.join(REPORT_MARKDOWN_FILE), &markdown).await?;

    let mut projects = Vec::new();
    write_projects_csv(&mut projects, &report)?;
    tokio::fs::write(dir.join(PROJECTS_CSV_FILE), projects).await?;
    let mut violations = Vec::new();
    write_violations_csv(&mut violations, run)?;
    tokio::fs::write(dir.join(VIOLATIONS_CSV_FILE), violations).await?;

    let prevalence = &report.population.prevalence;
    println!(
        "{:.2}% of {} sampled projects have issues (CI {:.2}% to {:.2}%, {} failed). Reports in {}.",
        prevalence.estimate,
        report.population.total_candidates,
        prevalence.lower,
        prevalence.upper,
        report.population.failed_projects,
        dir.display()
    );
    Ok(report)
}

#[cfg_attr(test, allow(dead_code))]
async fn run_validate(config: &SurveyConfig, overrides: &OverrideArgs) -> CliResult<()> {
    println!("Configuration is valid.");

    let checker = CommandChecker::new(config.analysis.checker.clone(), config.analysis.timeout());
    checker.probe().await?;
    println!("Checker `{}` is available.", checker.program());

    let client = GitHubClient::new(&config.discovery, require_token(overrides)?)?;
    let quota = client.rate_limit().await?;
    let reset = chrono::DateTime::from_timestamp(quota.reset, 0)
        .map(|at| at.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "GitHub credential accepted ({} of {} requests remaining, resets at {reset}).",
        quota.remaining, quota.limit
    );
    Ok(())
}

async fn write_json<T: serde::Serialize>(config: &SurveyConfig, name: &str, payload: &T) -> CliResult<PathBuf> {
    let dir = &config.report.output_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, render_json(payload)?).await?;
    log::info!("wrote {}", path.display());
    Ok(path)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use syntaxcensus_core::{
        BoxFuture, CensusError, FileAnalysisResult, ProjectAnalysis, ProjectFailure, Severity,
        SourceError, SourceResult, Violation, aggregate_files,
    };

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_requires_an_input() {
        assert!(Cli::try_parse_from(["syntaxcensus", "analyze"]).is_err());
        assert!(
            Cli::try_parse_from(["syntaxcensus", "analyze", "--whole-project", "--sample", "s.json"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "syntaxcensus",
            "-v",
            "analyze",
            "--dir",
            "checkouts",
            "--max-files",
            "5",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Analyze { source, overrides } => {
                assert_eq!(source.dir, Some(PathBuf::from("checkouts")));
                assert_eq!(overrides.max_files, Some(5));
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn overrides_replace_configured_values() {
        let mut config = SurveyConfig::default();
        let overrides = OverrideArgs {
            output_dir: Some(PathBuf::from("out")),
            sample_size: Some(50),
            min_stars: Some(0),
            min_forks: Some(3),
            concurrency: Some(4),
            max_file_size: Some(2048),
            max_files: Some(20),
            timeout_secs: Some(5),
            ..OverrideArgs::default()
        };

        apply_overrides(&mut config, &overrides);

        assert_eq!(config.report.output_dir, PathBuf::from("out"));
        assert_eq!(config.criteria.sample_size, Some(50));
        assert_eq!(config.criteria.min_stars, 0);
        assert_eq!(config.criteria.min_forks, 3);
        assert_eq!(config.analysis.concurrency, 4);
        assert_eq!(config.analysis.max_file_size, 2048);
        assert_eq!(config.analysis.max_files, 20);
        assert_eq!(config.analysis.timeout_secs, 5);
    }

    #[test]
    fn invalid_overrides_fail_fast() {
        let overrides = OverrideArgs {
            concurrency: Some(0),
            ..OverrideArgs::default()
        };
        let err = load_config(&overrides).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn discovery_requires_a_token() {
        assert!(require_token(&OverrideArgs::default()).is_err());
        let overrides = OverrideArgs {
            token: Some("  ".to_string()),
            ..OverrideArgs::default()
        };
        assert!(require_token(&overrides).is_err());
        let overrides = OverrideArgs {
            token: Some("ghp_abc".to_string()),
            ..OverrideArgs::default()
        };
        assert_eq!(require_token(&overrides).expect("token"), Some("ghp_abc".to_string()));
    }

    struct StaticSource;

    impl DiscoverySource for StaticSource {
        fn discover<'a>(
            &'a self,
            query: &'a str,
        ) -> BoxFuture<'a, SourceResult<Vec<RepositoryRecord>>> {
            Box::pin(async move {
                if query.contains("broken") {
                    return Err(SourceError::Transport("422 Validation Failed".to_string()));
                }
                Ok(vec![record("acme/web", 400), record("acme/api", 900)])
            })
        }

        fn fetch_manifest<'a>(
            &'a self,
            identity: &'a str,
            _path: &'a str,
        ) -> BoxFuture<'a, SourceResult<String>> {
            Box::pin(async move {
                if identity == "acme/api" {
                    Ok(r#"{"dependencies":{"express":"4"}}"#.to_string())
                } else {
                    Ok(r#"{"dependencies":{"react":"18.2.0"}}"#.to_string())
                }
            })
        }
    }

    fn record(name: &str, stars: u64) -> RepositoryRecord {
        RepositoryRecord {
            full_name: name.to_string(),
            stars,
            forks: 40,
            created_at: Utc::now(),
            language: Some("JavaScript".to_string()),
            description: None,
            clone_url: format!("https://github.com/{name}.git"),
            default_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn discovery_collects_warnings_and_validates() {
        let mut config = SurveyConfig::default();
        config.discovery.queries = vec!["react".to_string(), "broken query".to_string()];

        let outcome = discover_with(&StaticSource, &config).await.expect("discover");

        assert_eq!(outcome.sample.len(), 1);
        assert_eq!(outcome.sample[0].full_name, "acme/web");
        assert_eq!(outcome.summary.total_found, 2);
        assert_eq!(outcome.summary.total_invalid, 1);
        assert_eq!(outcome.summary.warnings.len(), 1);
    }

    #[tokio::test]
    async fn discovery_without_valid_candidates_fails() {
        let mut config = SurveyConfig::default();
        config.discovery.queries = vec!["broken".to_string()];
        let err = discover_with(&StaticSource, &config).await.unwrap_err();
        let census = err.downcast_ref::<CensusError>().expect("census error");
        assert!(matches!(census, CensusError::NoCandidates));
    }

    #[tokio::test]
    async fn local_records_skip_hidden_and_plain_files() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(root.path().join("zeta")).expect("zeta");
        std::fs::create_dir_all(root.path().join("alpha")).expect("alpha");
        std::fs::create_dir_all(root.path().join(".git")).expect("hidden");
        std::fs::write(root.path().join("notes.txt"), "x").expect("file");

        let records = local_records(root.path()).await.expect("records");
        let names: Vec<&str> = records.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn analyzes_local_checkouts_with_command_checker() {
        let root = tempfile::tempdir().expect("tempdir");
        let project = root.path().join("storefront").join("src");
        std::fs::create_dir_all(&project).expect("project");
        std::fs::write(project.join("app.js"), "const a = b?.c;").expect("app");
        std::fs::write(project.join("util.js"), "var x = 1;").expect("util");
        std::fs::create_dir_all(root.path().join("empty")).expect("empty");

        let mut config = SurveyConfig::default();
        config.analysis.checker.program = "sh".to_string();
        config.analysis.checker.args = vec![
            "-c".to_string(),
            r#"if grep -q '?\.'; then echo '[{"severity":2,"ruleId":"es-x/no-optional-chaining","message":"optional chaining"}]'; else echo '[]'; fi"#
                .to_string(),
        ];
        let source = AnalyzeSourceArgs {
            sample: None,
            dir: Some(root.path().to_path_buf()),
            whole_project: false,
        };

        let run = run_analyze(&config, &source, None).await.expect("analyze");

        assert_eq!(run.projects.len(), 1);
        assert_eq!(run.projects[0].statistics.total_files, 2);
        assert_eq!(run.projects[0].statistics.files_with_issues, 1);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].record.full_name, "empty");
    }

    #[tokio::test]
    async fn reports_are_written_to_the_output_dir() {
        let out = tempfile::tempdir().expect("tempdir");
        let mut config = SurveyConfig::default();
        config.report.output_dir = out.path().to_path_buf();

        let files = vec![FileAnalysisResult::completed(
            "src/a.js",
            vec![Violation {
                severity: Some(Severity::Warning),
                category: Some("javascript".to_string()),
                rule: Some("es-x/no-async-functions".to_string()),
                line: Some(2),
                column: Some(1),
                message: "async functions".to_string(),
                file: "src/a.js".to_string(),
            }],
        )];
        let statistics = aggregate_files(&files);
        let run = AnalysisRun {
            selection: None,
            projects: vec![ProjectAnalysis {
                record: record("acme/web", 400),
                files,
                statistics,
                skipped_files: 0,
            }],
            failures: vec![ProjectFailure {
                record: record("acme/gone", 100),
                reason: "repository inaccessible".to_string(),
            }],
        };

        let analysis = write_json(&config, ANALYSIS_FILE, &run).await.expect("analysis");
        let reloaded: AnalysisRun = read_json(&analysis).await.expect("reload");
        assert_eq!(reloaded, run);

        let report = write_reports(&config, &reloaded).await.expect("reports");
        assert_eq!(report.population.total_candidates, 2);
        for name in [
            REPORT_JSON_FILE,
            REPORT_YAML_FILE,
            REPORT_MARKDOWN_FILE,
            PROJECTS_CSV_FILE,
            VIOLATIONS_CSV_FILE,
        ] {
            assert!(out.path().join(name).exists(), "missing {name}");
        }
        let markdown = std::fs::read_to_string(out.path().join(REPORT_MARKDOWN_FILE)).expect("md");
        assert!(markdown.contains("of which 1 failed analysis"));
    }

    #[tokio::test]
    async fn missing_analysis_file_is_reported() {
        let err = read_json::<AnalysisRun>(Path::new("/nonexistent/analysis.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
