//! Path normalization and project-root containment

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors resolving a response path against the project root
#[derive(Debug, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("absolute path not allowed: {path}")]
    Absolute { path: String },

    #[error("path escapes project root: {path}")]
    EscapesRoot { path: String },

    #[error("failed to resolve {path}: {source}")]
    Resolve { path: PathBuf, source: io::Error },
}

/// Canonicalize separator style so `a\b`, `./a/b` and `a//b` all key as `a/b`
pub fn normalize_separators(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");

    let mut out = String::with_capacity(unified.len());
    for ch in unified.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }

    let mut trimmed = out.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Resolve a relative response path to a location inside `root`.
///
/// Absolute paths and `..` components that climb above the root are rejected
/// lexically. The deepest existing ancestor of the result is then canonicalized
/// so a symlink inside the tree cannot redirect a write outside it.
pub fn resolve_within_root(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_separators(relative);
    if normalized.is_empty() {
        return Err(PathError::Empty);
    }

    let mut clean = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(PathError::EscapesRoot { path: normalized });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute { path: normalized });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    let canonical_root = root.canonicalize().map_err(|e| PathError::Resolve {
        path: root.to_path_buf(),
        source: e,
    })?;
    let target = canonical_root.join(&clean);

    let mut probe = Some(target.as_path());
    while let Some(candidate) = probe {
        if candidate.symlink_metadata().is_ok() {
            // A dangling symlink cannot be canonicalized; treat it as unsafe.
            let resolved = candidate.canonicalize().map_err(|_| PathError::EscapesRoot {
                path: normalized.clone(),
            })?;
            if !resolved.starts_with(&canonical_root) {
                return Err(PathError::EscapesRoot { path: normalized });
            }
            break;
        }
        probe = candidate.parent();
    }

    Ok(target)
}
