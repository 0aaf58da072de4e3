//! Context blob construction
//!
//! Walks a source tree and concatenates matching files, each wrapped in
//! START/END markers carrying its relative path, kind and the `UPDATE`
//! action. The result parses directly with [`crate::response::ResponseParser`],
//! so a model can answer by editing blocks in place.

mod markup;
mod walker;

pub use walker::FileFilter;

use markup::pretty_print;
use walker::{SourceFile, discover_files};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::response::FileAction;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("source directory '{0}' does not exist or is not a directory")]
    NotADirectory(PathBuf),
}

/// Options controlling what goes into the blob and how it is rendered
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub filter: FileFilter,
    /// Pretty-print markup files
    pub format_markup: bool,
    /// Drop `<?xml ...?>` when pretty-printing
    pub strip_declaration: bool,
    /// Wrap files in START/END markers
    pub markers: bool,
    /// Remove every blank line from the final text
    pub strip_blank_lines: bool,
}

/// Counts reported after a build
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextStats {
    pub files_included: usize,
    pub files_failed: usize,
    pub markup_formatted: usize,
    pub bytes: usize,
}

/// Renders a source tree into one annotated text blob
pub struct ContextBuilder {
    options: ContextOptions,
}

impl ContextBuilder {
    pub fn new(options: ContextOptions) -> Self {
        Self { options }
    }

    /// Build the blob for `source_dir`. Unreadable files are logged and skipped.
    pub fn render(&self, source_dir: &Path) -> Result<(String, ContextStats), ContextError> {
        if !source_dir.is_dir() {
            return Err(ContextError::NotADirectory(source_dir.to_path_buf()));
        }

        info!("Combining files from '{}'", source_dir.display());
        let mut stats = ContextStats::default();
        let mut blob = String::new();

        for file in discover_files(source_dir, &self.options.filter) {
            debug!("Processing file: {}", file.path.display());

            let content = match fs::read_to_string(&file.path) {
                Ok(content) => content,
                Err(e) => {
                    error!("Error processing file '{}': {}", file.path.display(), e);
                    stats.files_failed += 1;
                    continue;
                }
            };

            let content = self.format(&file, content, &mut stats);
            self.append(&mut blob, &file, &content);
            stats.files_included += 1;
        }

        if self.options.strip_blank_lines {
            blob = strip_blank_lines(&blob);
        }

        stats.bytes = blob.len();
        info!(
            "Combined {} files ({} skipped)",
            stats.files_included, stats.files_failed
        );
        Ok((blob, stats))
    }

    fn format(&self, file: &SourceFile, content: String, stats: &mut ContextStats) -> String {
        if !(self.options.format_markup && file.kind.markup) {
            return content;
        }

        match pretty_print(&content, self.options.strip_declaration) {
            Ok(formatted) => {
                stats.markup_formatted += 1;
                formatted
            }
            Err(e) => {
                warn!(
                    "Could not format '{}', using original content: {}",
                    file.relative, e
                );
                content
            }
        }
    }

    fn append(&self, blob: &mut String, file: &SourceFile, content: &str) {
        let syntax = file.kind.syntax();

        if self.options.markers {
            blob.push_str(&syntax.start_line(&file.relative, &file.kind.label, FileAction::Update));
            blob.push('\n');
        }

        blob.push_str(content);
        if !content.is_empty() && !content.ends_with('\n') {
            blob.push('\n');
        }

        if self.options.markers {
            blob.push_str(&syntax.end_line(&file.relative, FileAction::Update));
            blob.push('\n');
        }
        blob.push_str("\n\n");
    }
}

/// Remove every line that is empty or whitespace-only
pub fn strip_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}
