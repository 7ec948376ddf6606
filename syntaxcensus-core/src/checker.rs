//! External syntax-compatibility checker invocation and output normalization.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{CheckerConfig, DIR_PLACEHOLDER, PATH_PLACEHOLDER};
use crate::domain::{Severity, Violation};
use crate::error::{CensusError, Result};
use crate::inspector::category_for;
use crate::source::BoxFuture;

/// Rule recorded for fatal parse failures that carry no rule id.
pub const PARSE_ERROR_RULE: &str = "parse-error";

/// A syntax-compatibility checker.
pub trait CompatibilityChecker: Send + Sync {
    /// Check one file's content. `path` is used for reporting and language detection.
    fn check_content<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Violation>>>;

    /// Check a whole checkout at once.
    fn check_directory<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<Violation>>>;
}

/// Runs the checker as a subprocess with a timeout.
#[derive(Debug, Clone)]
pub struct CommandChecker {
    config: CheckerConfig,
    timeout: Duration,
}

impl CommandChecker {
    /// Build a checker from its command configuration.
    pub fn new(config: CheckerConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Program that will be spawned.
    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Confirm the program can be spawned at all.
    pub async fn probe(&self) -> Result<()> {
        let mut command = Command::new(&self.config.program);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(self.timeout, command.status()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(CensusError::Config(format!(
                "checker `{}` cannot be started: {err}",
                self.config.program
            ))),
            Err(_) => Err(CensusError::Config(format!(
                "checker `{}` did not respond within {:?}",
                self.config.program, self.timeout
            ))),
        }
    }

    async fn run(&self, args: Vec<String>, stdin: Option<&str>) -> Result<CommandOutput> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let invocation = async {
            let mut child = command.spawn()?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                // A checker may exit before draining stdin; its output still counts.
                if let Err(err) = pipe.write_all(input.as_bytes()).await {
                    if err.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(err.into());
                    }
                }
                drop(pipe);
            }
            let output = child.wait_with_output().await?;
            Ok::<_, CensusError>(CommandOutput::from(output))
        };

        match tokio::time::timeout(self.timeout, invocation).await {
            Ok(result) => result,
            Err(_) => Err(CensusError::Other(format!(
                "checker timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn check_file(&self, path: &str, content: &str) -> Result<Vec<Violation>> {
        let args = substitute(&self.config.args, PATH_PLACEHOLDER, path);
        let output = self.run(args, Some(content)).await?;
        let stdout = output.require_stdout(&self.config.program)?;
        normalize_output(stdout, path, None)
    }

    async fn check_dir(&self, dir: &Path) -> Result<Vec<Violation>> {
        // Checkers report absolute paths; the root must match them to be stripped.
        let dir = tokio::fs::canonicalize(dir).await?;
        let dir = dir.as_path();
        let dir_arg = dir.display().to_string();
        let args = substitute(&self.config.directory_args, DIR_PLACEHOLDER, &dir_arg);
        let output = self.run(args, None).await?;
        let stdout = output.require_stdout(&self.config.program)?;
        normalize_output(stdout, "", Some(dir))
    }
}

impl CompatibilityChecker for CommandChecker {
    fn check_content<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Violation>>> {
        Box::pin(self.check_file(path, content))
    }

    fn check_directory<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<Violation>>> {
        Box::pin(self.check_dir(dir))
    }
}

#[derive(Debug, Clone)]
struct CommandOutput {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// Stdout when it carries a report. A failing exit with a report is
    /// normal for linters that exit non-zero on findings.
    fn require_stdout(&self, program: &str) -> Result<&str> {
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return Ok(stdout);
        }
        if self.status.success() {
            return Ok("[]");
        }
        let stderr = self.stderr.trim();
        let detail = if stderr.is_empty() {
            format!("{}", self.status)
        } else {
            stderr.lines().take(5).collect::<Vec<_>>().join("\n")
        };
        Err(CensusError::Other(format!("{program} failed: {detail}")))
    }
}

fn substitute(args: &[String], placeholder: &str, value: &str) -> Vec<String> {
    args.iter()
        .map(|arg| arg.replace(placeholder, value))
        .collect()
}

/// Flatten checker JSON into violations.
///
/// Accepts the nested `[{filePath, messages: [...]}]` shape and the flat
/// `[{file, severity, message, ...}]` shape. `default_path` is used when an
/// entry carries no path; `root` is stripped from absolute paths.
pub fn normalize_output(stdout: &str, default_path: &str, root: Option<&Path>) -> Result<Vec<Violation>> {
    let value: Value = serde_json::from_str(stdout)
        .map_err(|err| CensusError::Other(format!("malformed checker output: {err}")))?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(_) => vec![value],
        other => {
            return Err(CensusError::Other(format!(
                "malformed checker output: expected array or object, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut violations = Vec::new();
    for entry in &entries {
        let Some(object) = entry.as_object() else {
            return Err(CensusError::Other(
                "malformed checker output: entry is not an object".to_string(),
            ));
        };
        match object.get("messages").and_then(Value::as_array) {
            Some(messages) => {
                let file = entry_path(entry, &["filePath", "file", "path"], default_path, root);
                for message in messages {
                    violations.push(violation_from(message, &file));
                }
            }
            None => {
                let file = entry_path(entry, &["file", "filePath", "path"], default_path, root);
                violations.push(violation_from(entry, &file));
            }
        }
    }
    Ok(violations)
}

fn violation_from(message: &Value, file: &str) -> Violation {
    let fatal = message.get("fatal").and_then(Value::as_bool).unwrap_or(false);
    let rule = first_string(message, &["ruleId", "rule", "type"])
        .or_else(|| fatal.then(|| PARSE_ERROR_RULE.to_string()));
    let category = first_string(message, &["category"]).or_else(|| Some(category_for(file)));

    Violation {
        severity: severity_from(message.get("severity"), fatal),
        category,
        rule,
        line: first_u32(message, &["line"]),
        column: first_u32(message, &["column", "col"]),
        message: first_string(message, &["message", "msg"]).unwrap_or_default(),
        file: file.to_string(),
    }
}

fn severity_from(value: Option<&Value>, fatal: bool) -> Option<Severity> {
    if fatal {
        return Some(Severity::Error);
    }
    match value? {
        Value::Number(number) => Some(match number.as_i64() {
            Some(2) => Severity::Error,
            Some(1) => Severity::Warning,
            _ => Severity::Info,
        }),
        Value::String(label) => Severity::from_label(label),
        _ => None,
    }
}

fn entry_path(entry: &Value, keys: &[&str], default_path: &str, root: Option<&Path>) -> String {
    let Some(raw) = first_string(entry, keys) else {
        return default_path.to_string();
    };
    match root {
        Some(root) => Path::new(&raw)
            .strip_prefix(root)
            .map(|relative| {
                relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or(raw),
        None => raw,
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        })
}

fn first_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(Value::as_u64)
        .and_then(|number| u32::try_from(number).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
