//! Context builder configuration

use serde::Deserialize;

use crate::context::{ContextOptions, FileFilter};

/// Settings for `roundtrip context`
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// File suffixes to include
    pub extensions: Vec<String>,

    /// Directory names never descended into
    pub exclude_dirs: Vec<String>,

    /// Suffixes pretty-printed as XML
    pub markup_extensions: Vec<String>,

    /// Output file name, relative to the source directory
    pub output_file: String,

    pub format_markup: bool,
    pub strip_declaration: bool,
    pub markers: bool,
    pub strip_blank_lines: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".xml".to_string(), ".java".to_string()],
            exclude_dirs: vec!["target".to_string()],
            markup_extensions: vec![".xml".to_string()],
            output_file: "context.txt".to_string(),
            format_markup: true,
            strip_declaration: true,
            markers: true,
            strip_blank_lines: false,
        }
    }
}

/// The `[context]` table of one config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextLayer {
    pub extensions: Option<Vec<String>>,
    pub exclude_dirs: Option<Vec<String>>,
    pub markup_extensions: Option<Vec<String>>,
    pub output_file: Option<String>,
    pub format_markup: Option<bool>,
    pub strip_declaration: Option<bool>,
    pub markers: Option<bool>,
    pub strip_blank_lines: Option<bool>,
}

impl ContextConfig {
    /// Apply a config layer on top of this one; every key it sets wins
    pub fn merge(&mut self, layer: ContextLayer) {
        if let Some(extensions) = layer.extensions {
            self.extensions = extensions;
        }
        if let Some(exclude_dirs) = layer.exclude_dirs {
            self.exclude_dirs = exclude_dirs;
        }
        if let Some(markup_extensions) = layer.markup_extensions {
            self.markup_extensions = markup_extensions;
        }
        if let Some(output_file) = layer.output_file {
            self.output_file = output_file;
        }
        if let Some(format_markup) = layer.format_markup {
            self.format_markup = format_markup;
        }
        if let Some(strip_declaration) = layer.strip_declaration {
            self.strip_declaration = strip_declaration;
        }
        if let Some(markers) = layer.markers {
            self.markers = markers;
        }
        if let Some(strip_blank_lines) = layer.strip_blank_lines {
            self.strip_blank_lines = strip_blank_lines;
        }
    }

    /// Builder options with extensions normalized to lowercase `.ext` form
    pub fn to_options(&self) -> ContextOptions {
        ContextOptions {
            filter: FileFilter {
                extensions: normalize_extensions(&self.extensions),
                exclude_dirs: self.exclude_dirs.clone(),
                markup_extensions: normalize_extensions(&self.markup_extensions),
            },
            format_markup: self.format_markup,
            strip_declaration: self.strip_declaration,
            markers: self.markers,
            strip_blank_lines: self.strip_blank_lines,
        }
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}
