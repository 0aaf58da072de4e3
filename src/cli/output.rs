//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::context::ContextStats;
use crate::response::{BuildOutcome, BuildStepResult, FileOutcome, OutcomeStatus};
use serde::Serialize;
use std::str::FromStr;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            other => Err(format!(
                "unknown output mode '{}' (expected console, json or quiet)",
                other
            )),
        }
    }
}

/// Totals printed at the end of `apply`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplySummary {
    pub dry_run: bool,
    pub updated: Vec<String>,
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub no_changes: Vec<String>,
    pub warnings: usize,
    /// `None` when no build ran
    pub build_succeeded: Option<bool>,
}

impl ApplySummary {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.build_succeeded != Some(false)
    }
}

/// Events emitted while running a command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    ContextWritten {
        /// `None` when the blob went to stdout
        destination: Option<String>,
        #[serde(flatten)]
        stats: ContextStats,
    },
    ParseWarning {
        message: String,
    },
    File(FileOutcome),
    NoChanges {
        path: String,
    },
    Explanation {
        text: String,
    },
    ExplanationSaved {
        path: String,
    },
    BuildFinished(BuildStepResult),
    Summary(ApplySummary),
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Console output handler
pub struct ConsoleHandler {
    verbose: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }

    fn describe_outcome(outcome: &FileOutcome) -> String {
        match &outcome.status {
            OutcomeStatus::Updated => format!("✓ updated   {}", outcome.path),
            OutcomeStatus::CreatedFromUpdate => {
                format!("✓ created   {} (update of missing file)", outcome.path)
            }
            OutcomeStatus::Created => format!("✓ created   {}", outcome.path),
            OutcomeStatus::Removed => format!("✓ removed   {}", outcome.path),
            OutcomeStatus::Unchanged => format!("= unchanged {}", outcome.path),
            OutcomeStatus::Skipped { reason } => {
                format!("- skipped   {} ({})", outcome.path, reason)
            }
            OutcomeStatus::Failed { error } => format!("✗ failed    {}: {}", outcome.path, error),
        }
    }

    fn print_group(label: &str, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        eprintln!("  {} ({}):", label, paths.len());
        for path in paths {
            eprintln!("    {}", path);
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::ContextWritten { destination, stats } => {
                if let Some(dest) = destination {
                    eprintln!(
                        "Wrote {} files ({} bytes) to {}",
                        stats.files_included, stats.bytes, dest
                    );
                }
                if stats.files_failed > 0 {
                    eprintln!("{} files could not be read", stats.files_failed);
                }
            }
            OutputEvent::ParseWarning { message } => {
                if self.verbose {
                    eprintln!("warning: {}", message);
                }
            }
            OutputEvent::File(outcome) => {
                eprintln!("{}", Self::describe_outcome(&outcome));
            }
            OutputEvent::NoChanges { path } => {
                eprintln!("  no change {}", path);
            }
            OutputEvent::Explanation { text } => {
                println!("--- EXPLANATIONS ---");
                print!("{}", text);
            }
            OutputEvent::ExplanationSaved { path } => {
                eprintln!("Explanations saved to {}", path);
            }
            OutputEvent::BuildFinished(build) => match &build.outcome {
                BuildOutcome::Succeeded { duration_ms } => {
                    eprintln!(
                        "✓ Build succeeded: {} ({})",
                        build.command,
                        Self::format_duration(*duration_ms)
                    );
                }
                BuildOutcome::Failed {
                    exit_code,
                    duration_ms,
                } => {
                    let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                    eprintln!(
                        "✗ Build failed: {} (exit code {}, {})",
                        build.command,
                        code,
                        Self::format_duration(*duration_ms)
                    );
                    if let Some(report) = &build.report {
                        eprintln!("  report: {}", report.display());
                    }
                }
                BuildOutcome::Errored { message } => {
                    eprintln!("✗ Build could not run: {}", message);
                    if let Some(report) = &build.report {
                        eprintln!("  report: {}", report.display());
                    }
                }
            },
            OutputEvent::Summary(summary) => {
                eprintln!();
                if summary.dry_run {
                    eprintln!("Dry run, nothing was written:");
                } else {
                    eprintln!("Summary:");
                }
                Self::print_group("updated", &summary.updated);
                Self::print_group("created", &summary.created);
                Self::print_group("removed", &summary.removed);
                Self::print_group("unchanged", &summary.unchanged);
                Self::print_group("skipped", &summary.skipped);
                Self::print_group("failed", &summary.failed);
                Self::print_group("no changes", &summary.no_changes);
                if summary.warnings > 0 {
                    eprintln!("  {} parse warnings", summary.warnings);
                }
                if summary.success() {
                    eprintln!("✓ Done");
                } else {
                    eprintln!("✗ Completed with errors");
                }
            }
        }
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            print!("{}", out);
        }
    }
}

/// JSON output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        if let Ok(s) = self.to_json(value) {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }

    fn result(&self, success: bool, output: Option<&str>) {
        #[derive(Serialize)]
        struct FinalResult<'a> {
            success: bool,
            output: Option<&'a str>,
        }

        self.print_json(&FinalResult { success, output });
    }
}

/// Quiet handler: only content meant for stdout
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::Explanation { text } = event {
            print!("{}", text);
        }
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            print!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, verbose: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(verbose)),
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
