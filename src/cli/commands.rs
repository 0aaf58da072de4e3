//! CLI command implementations

use super::output::{ApplySummary, OutputEvent, OutputHandler};
use crate::config::{BuildConfig, ContextConfig, RoundtripConfig};
use crate::context::ContextBuilder;
use crate::response::{
    BuildRunner, ChangeApplicator, CommandBuildRunner, ParseResult, ReportSettings,
    run_build_step,
};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Where `context` sends the rendered blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextDestination {
    Stdout,
    File(PathBuf),
}

impl ContextDestination {
    /// Explicit output path, or the configured file name inside the source directory
    pub fn resolve(
        source_dir: &Path,
        output: Option<PathBuf>,
        stdout: bool,
        config: &ContextConfig,
    ) -> Self {
        if stdout {
            Self::Stdout
        } else {
            Self::File(output.unwrap_or_else(|| source_dir.join(&config.output_file)))
        }
    }
}

/// Build the context blob for a source tree
pub fn run_context(
    source_dir: &Path,
    destination: ContextDestination,
    config: &ContextConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let builder = ContextBuilder::new(config.to_options());
    let (blob, stats) = builder.render(source_dir)?;

    match destination {
        ContextDestination::Stdout => {
            handler.emit(OutputEvent::ContextWritten {
                destination: None,
                stats,
            });
            handler.result(true, Some(&blob));
        }
        ContextDestination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(&path, &blob).with_context(|| format!("writing {}", path.display()))?;
            info!("Output written to '{}'", path.display());

            handler.emit(OutputEvent::ContextWritten {
                destination: Some(path.display().to_string()),
                stats,
            });
        }
    }

    Ok(0)
}

/// Options for `apply` after CLI overrides
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub project_dir: PathBuf,
    pub explanations_output: Option<PathBuf>,
    pub dry_run: bool,
    pub build: bool,
}

/// Build runner for the configured command
pub fn build_runner(config: &BuildConfig) -> Result<CommandBuildRunner> {
    let Some(command) = config.command.as_deref().filter(|c| !c.trim().is_empty()) else {
        bail!("build requested but no build command is configured (set build.command or pass --build-command)");
    };

    Ok(CommandBuildRunner::new(command)
        .with_args(config.args.clone())
        .with_tool_dir(config.expanded_tool_dir())
        .with_env(config.env.clone())
        .with_timeout(config.timeout_duration()))
}

/// Apply a saved model response to a project tree
pub async fn run_apply(
    response_file: &Path,
    options: &ApplyOptions,
    config: &RoundtripConfig,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let text = std::fs::read(response_file)
        .with_context(|| format!("reading response file {}", response_file.display()))?;
    let text = String::from_utf8_lossy(&text);

    let parser = config
        .response
        .parser()
        .context("invalid marker syntax in configuration")?;

    let runner = if options.build && !options.dry_run {
        Some(build_runner(&config.build)?)
    } else {
        None
    };

    let parsed = parser.parse(&text);
    apply_parsed(
        &parsed,
        options,
        config,
        runner.as_ref().map(|r| r as &dyn BuildRunner),
        handler,
    )
    .await
}

/// Apply an already parsed response, then run the optional build
pub async fn apply_parsed(
    parsed: &ParseResult,
    options: &ApplyOptions,
    config: &RoundtripConfig,
    runner: Option<&dyn BuildRunner>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    if !options.project_dir.is_dir() {
        bail!(
            "project directory '{}' does not exist or is not a directory",
            options.project_dir.display()
        );
    }

    for warning in &parsed.warnings {
        handler.emit(OutputEvent::ParseWarning {
            message: warning.to_string(),
        });
    }

    if !parsed.has_operations() {
        info!("No file operations found in response");
    } else {
        info!(
            "Applying {} file operations under '{}'",
            parsed.operation_count(),
            options.project_dir.display()
        );
    }
    let report = ChangeApplicator::new(&options.project_dir)
        .with_dry_run(options.dry_run)
        .apply(parsed);
    info!("{} files changed", report.mutation_count());

    for outcome in &report.outcomes {
        handler.emit(OutputEvent::File(outcome.clone()));
    }
    for path in &parsed.no_changes {
        handler.emit(OutputEvent::NoChanges { path: path.clone() });
    }

    if let Some(text) = parsed.explanation.as_deref() {
        emit_explanation(text, options.explanations_output.as_deref(), handler);
    }

    let build = match runner {
        Some(runner) => {
            let settings = ReportSettings {
                file_name: config.build.report_file.clone(),
                on_success: config.build.report_success,
            };
            let result = run_build_step(runner, &options.project_dir, &settings).await;
            let succeeded = result.outcome.is_success();
            handler.emit(OutputEvent::BuildFinished(result));
            Some(succeeded)
        }
        None => {
            if options.build && options.dry_run {
                info!("Dry run, skipping build");
            }
            None
        }
    };

    let success = !report.has_failures() && build != Some(false);

    let to_strings = |paths: Vec<&str>| -> Vec<String> {
        paths.into_iter().map(str::to_string).collect()
    };
    let summary = ApplySummary {
        dry_run: report.dry_run,
        updated: to_strings(report.updated()),
        created: to_strings(report.created()),
        removed: to_strings(report.removed()),
        unchanged: to_strings(report.unchanged()),
        skipped: to_strings(report.skipped()),
        failed: to_strings(report.failed()),
        no_changes: parsed.no_changes.clone(),
        warnings: parsed.warnings.len(),
        build_succeeded: build,
    };
    handler.emit(OutputEvent::Summary(summary));

    Ok(if success { 0 } else { 1 })
}

fn emit_explanation(text: &str, output: Option<&Path>, handler: &dyn OutputHandler) {
    let Some(path) = output else {
        handler.emit(OutputEvent::Explanation {
            text: text.to_string(),
        });
        return;
    };

    match std::fs::write(path, text) {
        Ok(()) => {
            info!("Explanations saved to '{}'", path.display());
            handler.emit(OutputEvent::ExplanationSaved {
                path: path.display().to_string(),
            });
        }
        Err(e) => error!("Error writing explanations to '{}': {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::output::tests::MockHandler;
    use crate::response::{BuildError, BuildOutput, ResponseParser};
    use async_trait::async_trait;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedRunner {
        success: bool,
    }

    #[async_trait]
    impl BuildRunner for FixedRunner {
        async fn run(&self, _dir: &Path) -> Result<BuildOutput, BuildError> {
            Ok(BuildOutput {
                success: self.success,
                exit_code: Some(if self.success { 0 } else { 1 }),
                output: "compiler says hi\n".into(),
                duration: Duration::from_millis(5),
            })
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    fn parse(text: &str) -> ParseResult {
        ResponseParser::default().parse(text)
    }

    fn options(dir: &Path) -> ApplyOptions {
        ApplyOptions {
            project_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn write_response(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("response.txt");
        fs::write(&path, text).unwrap();
        path
    }

    fn summary(handler: &MockHandler) -> ApplySummary {
        handler
            .events()
            .into_iter()
            .find_map(|e| match e {
                OutputEvent::Summary(s) => Some(s),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_creates_file() {
        let project = TempDir::new().unwrap();
        let response = write_response(
            project.path(),
            "//--- START FILE: src/A.java (JAVA) - CREATE ---\nclass A {}\n//--- END FILE: src/A.java - CREATE ---\n",
        );
        let handler = MockHandler::new();

        let code = run_apply(
            &response,
            &options(project.path()),
            &RoundtripConfig::default(),
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert_eq!(
            fs::read_to_string(project.path().join("src/A.java")).unwrap(),
            "class A {}"
        );
        assert_eq!(summary(&handler).created, vec!["src/A.java"]);
    }

    #[tokio::test]
    async fn test_missing_response_file_is_fatal() {
        let project = TempDir::new().unwrap();
        let handler = MockHandler::new();

        let result = run_apply(
            &project.path().join("missing.txt"),
            &options(project.path()),
            &RoundtripConfig::default(),
            &handler,
        )
        .await;

        assert!(result.is_err());
        assert!(handler.events().is_empty());
    }

    #[tokio::test]
    async fn test_build_without_command_fails_before_mutation() {
        let project = TempDir::new().unwrap();
        let response = write_response(
            project.path(),
            "//--- START FILE: A.java (JAVA) - CREATE ---\nclass A {}\n//--- END FILE: A.java - CREATE ---\n",
        );
        let mut opts = options(project.path());
        opts.build = true;

        let result = run_apply(
            &response,
            &opts,
            &RoundtripConfig::default(),
            &MockHandler::new(),
        )
        .await;

        assert!(result.is_err());
        assert!(!project.path().join("A.java").exists());
    }

    #[tokio::test]
    async fn test_no_changes_notice_only() {
        let project = TempDir::new().unwrap();
        let parsed = parse("No changes to: src/B.java\n");
        let handler = MockHandler::new();

        let code = apply_parsed(
            &parsed,
            &options(project.path()),
            &RoundtripConfig::default(),
            None,
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let summary = summary(&handler);
        assert_eq!(summary.no_changes, vec!["src/B.java"]);
        assert!(summary.updated.is_empty() && summary.created.is_empty());
        assert!(handler.events().iter().any(
            |e| matches!(e, OutputEvent::NoChanges { path } if path == "src/B.java")
        ));
    }

    #[tokio::test]
    async fn test_failed_file_sets_exit_code() {
        let project = TempDir::new().unwrap();
        let parsed = parse(
            "//--- START FILE: ../escape.java (JAVA) - CREATE ---\nx\n//--- END FILE: ../escape.java - CREATE ---\n",
        );
        let handler = MockHandler::new();

        let code = apply_parsed(
            &parsed,
            &options(project.path()),
            &RoundtripConfig::default(),
            None,
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 1);
        assert_eq!(summary(&handler).failed, vec!["../escape.java"]);
    }

    #[tokio::test]
    async fn test_build_failure_sets_exit_code_and_keeps_changes() {
        let project = TempDir::new().unwrap();
        let parsed = parse(
            "//--- START FILE: A.java (JAVA) - CREATE ---\nclass A {}\n//--- END FILE: A.java - CREATE ---\n",
        );
        let handler = MockHandler::new();
        let runner = FixedRunner { success: false };

        let code = apply_parsed(
            &parsed,
            &options(project.path()),
            &RoundtripConfig::default(),
            Some(&runner),
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 1);
        assert!(project.path().join("A.java").exists());
        let report = fs::read_to_string(project.path().join("build-report.txt")).unwrap();
        assert!(report.starts_with("BUILD FAILED\n"));
        assert_eq!(summary(&handler).build_succeeded, Some(false));
    }

    #[tokio::test]
    async fn test_build_success() {
        let project = TempDir::new().unwrap();
        let handler = MockHandler::new();
        let runner = FixedRunner { success: true };

        let code = apply_parsed(
            &ParseResult::default(),
            &options(project.path()),
            &RoundtripConfig::default(),
            Some(&runner),
            &handler,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert!(!project.path().join("build-report.txt").exists());
        assert!(
            handler
                .events()
                .iter()
                .any(|e| matches!(e, OutputEvent::BuildFinished(b) if b.outcome.is_success()))
        );
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let project = TempDir::new().unwrap();
        let parsed = parse(
            "//--- START FILE: A.java (JAVA) - CREATE ---\nclass A {}\n//--- END FILE: A.java - CREATE ---\n",
        );
        let handler = MockHandler::new();
        let mut opts = options(project.path());
        opts.dry_run = true;

        apply_parsed(&parsed, &opts, &RoundtripConfig::default(), None, &handler)
            .await
            .unwrap();

        assert!(!project.path().join("A.java").exists());
        let summary = summary(&handler);
        assert!(summary.dry_run);
        assert_eq!(summary.created, vec!["A.java"]);
    }

    #[tokio::test]
    async fn test_explanations_to_file_and_handler() {
        let project = TempDir::new().unwrap();
        let parsed =
            parse("No changes to: A.java\n### EXPLANATIONS ###\nBecause.\n");

        let handler = MockHandler::new();
        apply_parsed(
            &parsed,
            &options(project.path()),
            &RoundtripConfig::default(),
            None,
            &handler,
        )
        .await
        .unwrap();
        assert!(handler.events().iter().any(
            |e| matches!(e, OutputEvent::Explanation { text } if text == "Because.\n")
        ));

        let out = project.path().join("explanations.md");
        let mut opts = options(project.path());
        opts.explanations_output = Some(out.clone());
        let handler = MockHandler::new();
        apply_parsed(&parsed, &opts, &RoundtripConfig::default(), None, &handler)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "Because.\n");
        assert!(
            !handler
                .events()
                .iter()
                .any(|e| matches!(e, OutputEvent::Explanation { .. }))
        );
    }

    #[tokio::test]
    async fn test_empty_explanations_section_still_written() {
        let project = TempDir::new().unwrap();
        let parsed = parse("No changes to: A.java\n### EXPLANATIONS ###\n");

        let out = project.path().join("explanations.md");
        fs::write(&out, "stale notes\n").unwrap();
        let mut opts = options(project.path());
        opts.explanations_output = Some(out.clone());
        let handler = MockHandler::new();
        apply_parsed(&parsed, &opts, &RoundtripConfig::default(), None, &handler)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "");

        let handler = MockHandler::new();
        apply_parsed(
            &parsed,
            &options(project.path()),
            &RoundtripConfig::default(),
            None,
            &handler,
        )
        .await
        .unwrap();
        assert!(handler.events().iter().any(
            |e| matches!(e, OutputEvent::Explanation { text } if text.is_empty())
        ));

        // no separator, no explanation event
        let handler = MockHandler::new();
        apply_parsed(
            &parse("No changes to: A.java\n"),
            &options(project.path()),
            &RoundtripConfig::default(),
            None,
            &handler,
        )
        .await
        .unwrap();
        assert!(
            !handler
                .events()
                .iter()
                .any(|e| matches!(e, OutputEvent::Explanation { .. }))
        );
    }

    #[tokio::test]
    async fn test_missing_project_dir() {
        let dir = TempDir::new().unwrap();
        let result = apply_parsed(
            &ParseResult::default(),
            &options(&dir.path().join("nope")),
            &RoundtripConfig::default(),
            None,
            &MockHandler::new(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_context_to_default_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A.java"), "class A {}\n").unwrap();
        let config = ContextConfig::default();
        let handler = MockHandler::new();

        let destination = ContextDestination::resolve(dir.path(), None, false, &config);
        let code = run_context(dir.path(), destination, &config, &handler).unwrap();

        assert_eq!(code, 0);
        let blob = fs::read_to_string(dir.path().join("context.txt")).unwrap();
        assert!(blob.contains("//--- START FILE: A.java (JAVA) - UPDATE ---"));
        assert!(handler.results().is_empty());
    }

    #[test]
    fn test_context_to_stdout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A.java"), "class A {}\n").unwrap();
        let config = ContextConfig::default();
        let handler = MockHandler::new();

        run_context(dir.path(), ContextDestination::Stdout, &config, &handler).unwrap();

        let results = handler.results();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.as_deref().unwrap().contains("class A {}"));
        assert!(!dir.path().join("context.txt").exists());
    }

    #[test]
    fn test_build_runner_requires_command() {
        assert!(build_runner(&BuildConfig::default()).is_err());

        let config = BuildConfig {
            command: Some("mvn".into()),
            args: vec!["compile".into()],
            ..Default::default()
        };
        assert_eq!(build_runner(&config).unwrap().describe(), "mvn compile");
    }

}
