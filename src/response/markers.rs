//! File marker syntaxes and line classification
//!
//! A marker syntax is a comment style wrapping the same logical marker:
//!
//! ```text
//! //--- START FILE: src/A.java (JAVA) - UPDATE ---
//! //--- END FILE: src/A.java - UPDATE ---
//! <!----- START FILE: pom.xml (XML) - UPDATE --- -->
//! <!----- END FILE: pom.xml - UPDATE --- -->
//! ```
//!
//! Every syntax in a [`MarkerSet`] is tried for each line; once a line
//! matches, the syntax it came from no longer matters.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::paths::normalize_separators;

/// Errors building a marker set
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("marker syntax '{name}' has an empty open delimiter")]
    EmptyDelimiter { name: String },

    #[error("invalid pattern for marker syntax '{name}': {source}")]
    Pattern { name: String, source: regex::Error },

    #[error("unknown file action '{0}'")]
    UnknownAction(String),
}

/// Operation a file block asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileAction {
    Create,
    Update,
    Remove,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Create => "CREATE",
            FileAction::Update => "UPDATE",
            FileAction::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileAction {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(FileAction::Create),
            "UPDATE" => Ok(FileAction::Update),
            "REMOVE" => Ok(FileAction::Remove),
            other => Err(MarkerError::UnknownAction(other.to_string())),
        }
    }
}

/// Whether a marker opens or closes a file block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRole {
    Start,
    End,
}

/// A comment style for file markers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerSyntax {
    /// Name used in logs and config
    pub name: String,
    /// Text preceding ` START FILE:` / ` END FILE:`
    pub open: String,
    /// Text following the action
    pub close: String,
}

impl MarkerSyntax {
    pub fn new(name: impl Into<String>, open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: open.into(),
            close: close.into(),
        }
    }

    /// `//--- ... ---`, used for source files
    pub fn slash() -> Self {
        Self::new("slash", "//---", "---")
    }

    /// `<!----- ... --- -->`, used for markup files
    pub fn xml_comment() -> Self {
        Self::new("xml-comment", "<!-----", "--- -->")
    }

    /// Render a START marker line (without line ending)
    pub fn start_line(&self, path: &str, kind: &str, action: FileAction) -> String {
        format!(
            "{} START FILE: {} ({}) - {} {}",
            self.open, path, kind, action, self.close
        )
    }

    /// Render an END marker line (without line ending)
    pub fn end_line(&self, path: &str, action: FileAction) -> String {
        format!("{} END FILE: {} - {} {}", self.open, path, action, self.close)
    }
}

/// A recognized marker line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub role: MarkerRole,
    /// Normalized relative path
    pub path: String,
    pub action: FileAction,
    /// Kind label from START markers (`JAVA`, `XML`, ...)
    pub kind: Option<String>,
    /// Name of the syntax that matched
    pub syntax: String,
}

/// Classification of a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    Marker(Marker),
    /// Starts like a marker but does not fully match any pattern
    Malformed,
    None,
}

#[derive(Debug, Clone)]
struct CompiledSyntax {
    name: String,
    start: Regex,
    end: Regex,
    prefix: Regex,
}

impl CompiledSyntax {
    fn compile(syntax: &MarkerSyntax) -> Result<Self, MarkerError> {
        if syntax.open.is_empty() {
            return Err(MarkerError::EmptyDelimiter {
                name: syntax.name.clone(),
            });
        }

        let open = regex::escape(&syntax.open);
        let close = regex::escape(&syntax.close);
        let build = |pattern: String| {
            Regex::new(&pattern).map_err(|e| MarkerError::Pattern {
                name: syntax.name.clone(),
                source: e,
            })
        };

        Ok(Self {
            name: syntax.name.clone(),
            start: build(format!(
                r"^{open} START FILE: (?P<path>.+) \((?P<kind>[A-Za-z0-9_]+)\) - (?P<action>CREATE|UPDATE|REMOVE) {close}"
            ))?,
            end: build(format!(
                r"^{open} END FILE: (?P<path>.+) - (?P<action>CREATE|UPDATE|REMOVE) {close}"
            ))?,
            prefix: build(format!(r"^{open} (?:START|END) FILE:"))?,
        })
    }
}

/// The explicit table of marker syntaxes the parser recognizes
#[derive(Debug, Clone)]
pub struct MarkerSet {
    syntaxes: Vec<CompiledSyntax>,
}

impl MarkerSet {
    /// Compile a marker set from syntaxes, tried in the given order
    pub fn new<'a>(syntaxes: impl IntoIterator<Item = &'a MarkerSyntax>) -> Result<Self, MarkerError> {
        let syntaxes = syntaxes
            .into_iter()
            .map(CompiledSyntax::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { syntaxes })
    }

    /// The built-in syntaxes: `slash` and `xml-comment`
    pub fn standard_syntaxes() -> Vec<MarkerSyntax> {
        vec![MarkerSyntax::slash(), MarkerSyntax::xml_comment()]
    }

    /// Marker set with only the built-in syntaxes
    pub fn standard() -> Self {
        Self::new(&Self::standard_syntaxes()).expect("built-in marker syntaxes compile")
    }

    /// Names of the syntaxes in this set
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.syntaxes.iter().map(|s| s.name.as_str())
    }

    /// Classify a line (line ending already removed)
    pub fn classify(&self, line: &str) -> LineMatch {
        for syntax in &self.syntaxes {
            if let Some(caps) = syntax.start.captures(line) {
                if let Ok(action) = caps["action"].parse() {
                    return LineMatch::Marker(Marker {
                        role: MarkerRole::Start,
                        path: normalize_separators(&caps["path"]),
                        action,
                        kind: Some(caps["kind"].to_string()),
                        syntax: syntax.name.clone(),
                    });
                }
            }
        }

        for syntax in &self.syntaxes {
            if let Some(caps) = syntax.end.captures(line) {
                if let Ok(action) = caps["action"].parse() {
                    return LineMatch::Marker(Marker {
                        role: MarkerRole::End,
                        path: normalize_separators(&caps["path"]),
                        action,
                        kind: None,
                        syntax: syntax.name.clone(),
                    });
                }
            }
        }

        if self.syntaxes.iter().any(|s| s.prefix.is_match(line)) {
            return LineMatch::Malformed;
        }

        LineMatch::None
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::standard()
    }
}
