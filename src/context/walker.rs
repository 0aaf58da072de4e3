//! Source file discovery

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::response::MarkerSyntax;

/// How a discovered file is labelled and wrapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKind {
    /// Label inside the START marker (`JAVA`, `XML`, ...)
    pub label: String,
    /// Pretty-printable markup
    pub markup: bool,
}

impl FileKind {
    /// Marker syntax that reads as a comment in this kind of file
    pub fn syntax(&self) -> MarkerSyntax {
        if self.markup {
            MarkerSyntax::xml_comment()
        } else {
            MarkerSyntax::slash()
        }
    }
}

/// A file selected for the context blob
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated
    pub relative: String,
    pub kind: FileKind,
}

/// Which files to pick up during the walk
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// Lowercase suffixes such as `.java`
    pub extensions: Vec<String>,
    /// Directory names pruned from the walk
    pub exclude_dirs: Vec<String>,
    /// Suffixes treated as markup
    pub markup_extensions: Vec<String>,
}

impl FileFilter {
    fn matching_extension(&self, file_name: &str) -> Option<&str> {
        let lower = file_name.to_lowercase();
        self.extensions
            .iter()
            .find(|ext| lower.ends_with(ext.to_lowercase().as_str()))
            .map(String::as_str)
    }

    fn kind_for(&self, file_name: &str, extension: &str) -> FileKind {
        let lower = file_name.to_lowercase();
        let markup = self
            .markup_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.to_lowercase().as_str()));
        let label = extension.trim_start_matches('.').to_uppercase();
        FileKind {
            label: if label.is_empty() { "TEXT".to_string() } else { label },
            markup,
        }
    }
}

/// Walk `root` and return matching files in a stable, name-sorted order
pub fn discover_files(root: &Path, filter: &FileFilter) -> Vec<SourceFile> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let excluded = entry.depth() > 0
                && entry.file_type().is_dir()
                && filter
                    .exclude_dirs
                    .iter()
                    .any(|name| entry.file_name() == name.as_str());
            if excluded {
                debug!("skipping excluded directory {}", entry.path().display());
            }
            !excluded
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let Some(extension) = filter.matching_extension(&file_name) else {
            continue;
        };
        let kind = filter.kind_for(&file_name, extension);

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            relative,
            kind,
        });
    }

    files
}
