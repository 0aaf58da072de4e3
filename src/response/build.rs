//! Optional post-apply build step
//!
//! The build tool is behind the [`BuildRunner`] trait so the apply command
//! does not depend on how (or whether) a build is executed. Build results are
//! persisted as a plain-text report in the project root.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::process::{CapturedOutput, capture_output};

/// Errors that prevent a build from producing an exit status
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command '{command}' failed to spawn: {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("build timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read build output: {0}")]
    OutputError(std::io::Error),

    #[error("invalid PATH entry {path}: {message}")]
    InvalidPath { path: PathBuf, message: String },
}

/// A build that ran to completion (successfully or not)
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout and stderr combined
    pub output: String,
    pub duration: Duration,
}

/// Something that can build a project directory
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run the build in `project_root`
    async fn run(&self, project_root: &Path) -> Result<BuildOutput, BuildError>;

    /// Human-readable description for logs and reports
    fn describe(&self) -> String;
}

/// Runs a configured program with arguments
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    program: String,
    args: Vec<String>,
    tool_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandBuildRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            tool_dir: None,
            env: HashMap::new(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Directory prepended to `PATH` for the build process
    pub fn with_tool_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.tool_dir = dir;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `PATH` with the tool directory in front, or `None` to inherit
    fn search_path(&self) -> Result<Option<OsString>, BuildError> {
        let Some(dir) = &self.tool_dir else {
            return Ok(None);
        };

        let mut entries = vec![dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            entries.extend(std::env::split_paths(&existing));
        }

        std::env::join_paths(entries)
            .map(Some)
            .map_err(|e| BuildError::InvalidPath {
                path: dir.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn run(&self, project_root: &Path) -> Result<BuildOutput, BuildError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(path) = self.search_path()? {
            cmd.env("PATH", path);
        }

        debug!("spawning build: {}", self.describe());
        let mut child = cmd.spawn().map_err(|e| BuildError::SpawnFailed {
            command: self.describe(),
            source: e,
        })?;

        let captured: CapturedOutput = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, capture_output(&mut child)).await {
                Ok(result) => result.map_err(BuildError::OutputError)?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(BuildError::Timeout(limit));
                }
            },
            None => capture_output(&mut child)
                .await
                .map_err(BuildError::OutputError)?,
        };

        Ok(BuildOutput {
            success: captured.success,
            exit_code: captured.exit_code,
            output: captured.combined(),
            duration: start.elapsed(),
        })
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Where and when to write build reports
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Report file name, relative to the project root
    pub file_name: String,
    /// Also write a report when the build succeeds
    pub on_success: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            file_name: "build-report.txt".to_string(),
            on_success: false,
        }
    }
}

/// Result of the build step as seen by the apply command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    Succeeded { duration_ms: u64 },
    Failed { exit_code: Option<i32>, duration_ms: u64 },
    /// The build could not be run at all
    Errored { message: String },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded { .. })
    }
}

/// Build step outcome plus the report it persisted
#[derive(Debug, Clone, Serialize)]
pub struct BuildStepResult {
    pub command: String,
    #[serde(flatten)]
    pub outcome: BuildOutcome,
    pub report: Option<PathBuf>,
}

/// Run the build and persist a report. Never fails: problems running the
/// build become [`BuildOutcome::Errored`].
pub async fn run_build_step(
    runner: &dyn BuildRunner,
    project_root: &Path,
    settings: &ReportSettings,
) -> BuildStepResult {
    let command = runner.describe();
    info!("Running build: {}", command);

    let (outcome, report_body) = match runner.run(project_root).await {
        Ok(build) if build.success => {
            info!("Build succeeded in {:?}", build.duration);
            let outcome = BuildOutcome::Succeeded {
                duration_ms: build.duration.as_millis() as u64,
            };
            let body = settings.on_success.then_some(build.output);
            (outcome, body)
        }
        Ok(build) => {
            error!("Build failed with exit code {:?}", build.exit_code);
            let outcome = BuildOutcome::Failed {
                exit_code: build.exit_code,
                duration_ms: build.duration.as_millis() as u64,
            };
            (outcome, Some(build.output))
        }
        Err(e) => {
            error!("Build could not be run: {}", e);
            let message = e.to_string();
            (
                BuildOutcome::Errored {
                    message: message.clone(),
                },
                Some(message),
            )
        }
    };

    let report = report_body.and_then(|body| {
        let path = project_root.join(&settings.file_name);
        let contents = render_report(outcome.is_success(), &command, &body);
        match std::fs::write(&path, contents) {
            Ok(()) => {
                info!("Build report written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to write build report {}: {}", path.display(), e);
                None
            }
        }
    });

    BuildStepResult {
        command,
        outcome,
        report,
    }
}

/// Report text: status line, timestamp, command, blank line, output
pub fn render_report(success: bool, command: &str, output: &str) -> String {
    let status = if success { "BUILD SUCCEEDED" } else { "BUILD FAILED" };
    let timestamp = chrono::Local::now().to_rfc3339();
    format!(
        "{}\nTimestamp: {}\nCommand: {}\n\n{}",
        status, timestamp, command, output
    )
}
