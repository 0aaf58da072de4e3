//! Build step configuration

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT: u64 = 600; // 10 minutes
const DEFAULT_REPORT_FILE: &str = "build-report.txt";

/// Configuration for the optional post-apply build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Run the build after applying changes
    pub enabled: bool,

    /// Program to execute (e.g. "mvn")
    pub command: Option<String>,

    /// Arguments to pass to the command
    pub args: Vec<String>,

    /// Directory prepended to PATH for the build (supports ~)
    pub tool_dir: Option<String>,

    /// Additional environment variables for the command
    pub env: HashMap<String, String>,

    /// Timeout in seconds (0 disables the limit)
    pub timeout: u64,

    /// Report file name, relative to the project root
    pub report_file: String,

    /// Also write a report when the build succeeds
    pub report_success: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            args: Vec::new(),
            tool_dir: None,
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            report_file: DEFAULT_REPORT_FILE.to_string(),
            report_success: false,
        }
    }
}

/// The `[build]` table of one config file; unset keys keep the lower layer's value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildLayer {
    pub enabled: Option<bool>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    /// An empty string clears a tool directory set by a lower layer
    pub tool_dir: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub timeout: Option<u64>,
    pub report_file: Option<String>,
    pub report_success: Option<bool>,
}

impl BuildConfig {
    /// Timeout as a duration, `None` when disabled
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Tool directory with `~` expanded
    pub fn expanded_tool_dir(&self) -> Option<PathBuf> {
        self.tool_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
    }

    /// Replace command and arguments with a shell-quoted command line
    pub fn set_command_line(&mut self, line: &str) -> Result<()> {
        let mut words = shell_words::split(line)
            .with_context(|| format!("parsing build command '{}'", line))?
            .into_iter();
        let Some(program) = words.next() else {
            bail!("build command is empty");
        };
        self.command = Some(program);
        self.args = words.collect();
        Ok(())
    }

    /// Apply a config layer on top of this one. A layer that names a new
    /// command without `args` also clears the previous arguments.
    pub fn merge(&mut self, layer: BuildLayer) {
        if let Some(enabled) = layer.enabled {
            self.enabled = enabled;
        }
        match (layer.command, layer.args) {
            (Some(command), args) => {
                self.command = Some(command);
                self.args = args.unwrap_or_default();
            }
            (None, Some(args)) => self.args = args,
            (None, None) => {}
        }
        if let Some(tool_dir) = layer.tool_dir {
            self.tool_dir = (!tool_dir.is_empty()).then_some(tool_dir);
        }
        if let Some(env) = layer.env {
            self.env.extend(env);
        }
        if let Some(timeout) = layer.timeout {
            self.timeout = timeout;
        }
        if let Some(report_file) = layer.report_file {
            self.report_file = report_file;
        }
        if let Some(report_success) = layer.report_success {
            self.report_success = report_success;
        }
    }
}
