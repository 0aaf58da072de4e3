//! Apply parsed file operations to a project tree
//!
//! Operations run in the order updates, creations, removals. A failure on
//! one file is recorded in its [`FileOutcome`] and never stops the batch.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use super::markers::FileAction;
use super::parser::ParseResult;
use crate::paths::{PathError, resolve_within_root};

/// Per-file errors while applying
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("failed to read file {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },

    #[error("failed to write file {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },

    #[error("failed to create directory {path}: {source}")]
    CreateDirError { path: PathBuf, source: io::Error },

    #[error("failed to remove file {path}: {source}")]
    RemoveError { path: PathBuf, source: io::Error },

    #[error("refusing to remove directory {path}")]
    IsDirectory { path: PathBuf },
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Updated,
    /// UPDATE for a file that did not exist
    CreatedFromUpdate,
    Created,
    Removed,
    /// Existing content normalizes equal to the proposed content
    Unchanged,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub action: FileAction,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Whether the file was (or in dry-run mode, would be) written or deleted
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Updated
                | OutcomeStatus::CreatedFromUpdate
                | OutcomeStatus::Created
                | OutcomeStatus::Removed
        )
    }
}

/// Outcomes for a whole batch, in processing order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    pub outcomes: Vec<FileOutcome>,
}

impl ApplyReport {
    fn paths_where(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.path.as_str())
            .collect()
    }

    pub fn updated(&self) -> Vec<&str> {
        self.paths_where(|s| matches!(s, OutcomeStatus::Updated))
    }

    /// Files created by CREATE, or by UPDATE of a missing file
    pub fn created(&self) -> Vec<&str> {
        self.paths_where(|s| {
            matches!(s, OutcomeStatus::Created | OutcomeStatus::CreatedFromUpdate)
        })
    }

    pub fn removed(&self) -> Vec<&str> {
        self.paths_where(|s| matches!(s, OutcomeStatus::Removed))
    }

    pub fn unchanged(&self) -> Vec<&str> {
        self.paths_where(|s| matches!(s, OutcomeStatus::Unchanged))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.paths_where(|s| matches!(s, OutcomeStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.paths_where(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(FileOutcome::is_failure)
    }

    pub fn mutation_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_mutation()).count()
    }
}

/// Coarse comparison form: each line trimmed, blank lines dropped
pub fn normalize_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Whether two contents differ by more than whitespace and blank lines
pub fn is_significant_change(original: &str, proposed: &str) -> bool {
    normalize_lines(original) != normalize_lines(proposed)
}

/// Applies a [`ParseResult`] under a project root
pub struct ChangeApplicator {
    root: PathBuf,
    dry_run: bool,
}

impl ChangeApplicator {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dry_run: false,
        }
    }

    /// Report outcomes without touching the filesystem
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply every operation in the parse result
    pub fn apply(&self, parsed: &ParseResult) -> ApplyReport {
        let mut report = ApplyReport {
            dry_run: self.dry_run,
            outcomes: Vec::with_capacity(parsed.operation_count()),
        };

        if !parsed.updates.is_empty() {
            info!("Applying file updates...");
        }
        for body in &parsed.updates {
            let status = self.settle(&body.path, FileAction::Update, |target| {
                self.apply_update(target, &body.content)
            });
            report.outcomes.push(FileOutcome {
                path: body.path.clone(),
                action: FileAction::Update,
                status,
            });
        }

        if !parsed.creations.is_empty() {
            info!("Creating new files...");
        }
        for body in &parsed.creations {
            let status = self.settle(&body.path, FileAction::Create, |target| {
                self.apply_create(target, &body.content)
            });
            report.outcomes.push(FileOutcome {
                path: body.path.clone(),
                action: FileAction::Create,
                status,
            });
        }

        if !parsed.removals.is_empty() {
            info!("Removing files...");
        }
        for path in &parsed.removals {
            let status = self.settle(path, FileAction::Remove, |target| self.apply_remove(target));
            report.outcomes.push(FileOutcome {
                path: path.clone(),
                action: FileAction::Remove,
                status,
            });
        }

        report
    }

    /// Resolve the path, run the operation and turn any error into an outcome
    fn settle(
        &self,
        path: &str,
        action: FileAction,
        op: impl FnOnce(&Path) -> Result<OutcomeStatus, ApplyError>,
    ) -> OutcomeStatus {
        let result = resolve_within_root(&self.root, path)
            .map_err(ApplyError::from)
            .and_then(|target| op(&target));

        match result {
            Ok(OutcomeStatus::Skipped { reason }) => {
                warn!("{} {}: {}", action, path, reason);
                OutcomeStatus::Skipped { reason }
            }
            Ok(status) => {
                info!("{} {}: {}", action, path, describe(&status, self.dry_run));
                status
            }
            Err(e) => {
                error!("Error processing {} {}: {}", action, path, e);
                OutcomeStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn apply_update(&self, target: &Path, content: &str) -> Result<OutcomeStatus, ApplyError> {
        if !target.exists() {
            self.write_new(target, content)?;
            return Ok(OutcomeStatus::CreatedFromUpdate);
        }

        let bytes = fs::read(target).map_err(|e| ApplyError::ReadError {
            path: target.to_path_buf(),
            source: e,
        })?;
        let original = String::from_utf8_lossy(&bytes);

        if !is_significant_change(&original, content) {
            return Ok(OutcomeStatus::Unchanged);
        }

        if !self.dry_run {
            fs::write(target, content).map_err(|e| ApplyError::WriteError {
                path: target.to_path_buf(),
                source: e,
            })?;
        }
        Ok(OutcomeStatus::Updated)
    }

    fn apply_create(&self, target: &Path, content: &str) -> Result<OutcomeStatus, ApplyError> {
        if target.exists() {
            return Ok(OutcomeStatus::Skipped {
                reason: "file already exists, skipping creation".to_string(),
            });
        }

        self.write_new(target, content)?;
        Ok(OutcomeStatus::Created)
    }

    fn apply_remove(&self, target: &Path) -> Result<OutcomeStatus, ApplyError> {
        let metadata = match fs::symlink_metadata(target) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(OutcomeStatus::Skipped {
                    reason: "file to remove not found".to_string(),
                });
            }
            Err(e) => {
                return Err(ApplyError::ReadError {
                    path: target.to_path_buf(),
                    source: e,
                });
            }
        };

        if metadata.is_dir() {
            return Err(ApplyError::IsDirectory {
                path: target.to_path_buf(),
            });
        }

        if !self.dry_run {
            fs::remove_file(target).map_err(|e| ApplyError::RemoveError {
                path: target.to_path_buf(),
                source: e,
            })?;
        }
        Ok(OutcomeStatus::Removed)
    }

    fn write_new(&self, target: &Path, content: &str) -> Result<(), ApplyError> {
        if self.dry_run {
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ApplyError::CreateDirError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(target, content).map_err(|e| ApplyError::WriteError {
            path: target.to_path_buf(),
            source: e,
        })
    }
}

fn describe(status: &OutcomeStatus, dry_run: bool) -> String {
    let text = match status {
        OutcomeStatus::Updated => "updated (content changed)",
        OutcomeStatus::CreatedFromUpdate => "file not found for update, created new file",
        OutcomeStatus::Created => "created new file",
        OutcomeStatus::Removed => "removed file",
        OutcomeStatus::Unchanged => "skipped (no significant content changes)",
        OutcomeStatus::Skipped { reason } => reason.as_str(),
        OutcomeStatus::Failed { error } => error.as_str(),
    };
    if dry_run && !matches!(status, OutcomeStatus::Unchanged) {
        format!("would be {}", text)
    } else {
        text.to_string()
    }
}
