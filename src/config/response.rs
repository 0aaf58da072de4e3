//! Response parsing and apply configuration

use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::response::{
    DEFAULT_EXPLANATIONS_SEPARATOR, DEFAULT_NO_CHANGE_PREFIX, MarkerError, MarkerSet,
    MarkerSyntax, ResponseParser,
};

/// Settings for `roundtrip apply`
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseConfig {
    /// Line that switches the rest of the response to explanation text
    pub explanations_separator: String,

    /// Prefix of "no changes" notices
    pub no_change_prefix: String,

    /// Marker syntaxes recognized in addition to the built-in ones
    pub syntaxes: Vec<MarkerSyntax>,

    /// Where to save explanations (supports ~)
    pub explanations_file: Option<String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            explanations_separator: DEFAULT_EXPLANATIONS_SEPARATOR.to_string(),
            no_change_prefix: DEFAULT_NO_CHANGE_PREFIX.to_string(),
            syntaxes: Vec::new(),
            explanations_file: None,
        }
    }
}

/// The `[response]` table of one config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseLayer {
    pub explanations_separator: Option<String>,
    pub no_change_prefix: Option<String>,
    /// Replaces lower-layer syntaxes with the same name, appends the rest
    pub syntaxes: Option<Vec<MarkerSyntax>>,
    /// An empty string clears a file set by a lower layer
    pub explanations_file: Option<String>,
}

impl ResponseConfig {
    /// Apply a config layer on top of this one; every key it sets wins
    pub fn merge(&mut self, layer: ResponseLayer) {
        if let Some(separator) = layer.explanations_separator {
            self.explanations_separator = separator;
        }
        if let Some(prefix) = layer.no_change_prefix {
            self.no_change_prefix = prefix;
        }
        for syntax in layer.syntaxes.unwrap_or_default() {
            self.syntaxes.retain(|s| s.name != syntax.name);
            self.syntaxes.push(syntax);
        }
        if let Some(file) = layer.explanations_file {
            self.explanations_file = (!file.is_empty()).then_some(file);
        }
    }

    /// Parser over the built-in syntaxes followed by the configured ones
    pub fn parser(&self) -> Result<ResponseParser, MarkerError> {
        let mut syntaxes = MarkerSet::standard_syntaxes();
        syntaxes.extend(self.syntaxes.iter().cloned());
        let markers = MarkerSet::new(&syntaxes)?;
        debug!(
            "Marker syntaxes: {}",
            markers.names().collect::<Vec<_>>().join(", ")
        );

        Ok(ResponseParser::new(markers)
            .with_separator(self.explanations_separator.clone())
            .with_no_change_prefix(self.no_change_prefix.clone()))
    }

    pub fn expanded_explanations_file(&self) -> Option<PathBuf> {
        self.explanations_file
            .as_deref()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
    }
}
