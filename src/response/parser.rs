//! Marker-scan parser for model responses
//!
//! Recovers file operations from a semi-structured response in one forward
//! pass. Each line is tested in this order:
//!
//! 1. inside the explanation section: captured verbatim
//! 2. START marker (any syntax)
//! 3. END marker (any syntax)
//! 4. explanation separator
//! 5. `No changes to: <path>` notice
//! 6. content line
//!
//! Malformed input never fails the parse. Every anomaly is logged at warn
//! level and recorded in [`ParseResult::warnings`].

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::markers::{FileAction, LineMatch, Marker, MarkerRole, MarkerSet};
use crate::paths::normalize_separators;

pub const DEFAULT_EXPLANATIONS_SEPARATOR: &str = "### EXPLANATIONS ###";
pub const DEFAULT_NO_CHANGE_PREFIX: &str = "No changes to: ";

/// A structural anomaly found while scanning
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParseWarning {
    #[error("line {line}: start marker for {new_path} before end marker of {open_path}, discarding {open_path}")]
    UnexpectedStart {
        line: usize,
        open_path: String,
        new_path: String,
    },

    #[error("line {line}: end marker for {path} ({action}) without a start marker")]
    UnmatchedEnd {
        line: usize,
        path: String,
        action: FileAction,
    },

    #[error(
        "line {line}: start/end marker mismatch: start='{start_path} ({start_action})', end='{end_path} ({end_action})'"
    )]
    MarkerMismatch {
        line: usize,
        start_path: String,
        start_action: FileAction,
        end_path: String,
        end_action: FileAction,
    },

    #[error("content found for REMOVE of {path} ({lines} lines), content ignored")]
    RemoveWithContent { path: String, lines: usize },

    #[error("file {path} started at line {line} but never ended, content discarded")]
    UnterminatedFile { path: String, line: usize },

    #[error("file {path} started at line {line} was interrupted by the explanations section, content discarded")]
    InterruptedByExplanations { path: String, line: usize },

    #[error("line {line}: unrecognized file marker treated as content")]
    UnrecognizedMarker { line: usize },

    #[error("{path} was already marked {previous}, now {current}; last operation wins")]
    ConflictingOperation {
        path: String,
        previous: FileAction,
        current: FileAction,
    },
}

/// A committed CREATE or UPDATE
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileBody {
    pub path: String,
    pub content: String,
}

/// Everything recovered from one response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    /// UPDATE bodies in discovery order
    pub updates: Vec<FileBody>,
    /// CREATE bodies in discovery order
    pub creations: Vec<FileBody>,
    /// REMOVE paths in discovery order
    pub removals: Vec<String>,
    /// Paths the response declared unchanged
    pub no_changes: Vec<String>,
    /// Free text after the explanation separator
    pub explanation: Option<String>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseResult {
    pub fn update(&self, path: &str) -> Option<&str> {
        find_body(&self.updates, path)
    }

    pub fn creation(&self, path: &str) -> Option<&str> {
        find_body(&self.creations, path)
    }

    pub fn is_removal(&self, path: &str) -> bool {
        self.removals.iter().any(|p| p == path)
    }

    /// Number of file operations (updates, creations and removals)
    pub fn operation_count(&self) -> usize {
        self.updates.len() + self.creations.len() + self.removals.len()
    }

    pub fn has_operations(&self) -> bool {
        self.operation_count() > 0
    }

    /// Action currently committed for a path
    pub fn action_for(&self, path: &str) -> Option<FileAction> {
        if self.update(path).is_some() {
            Some(FileAction::Update)
        } else if self.creation(path).is_some() {
            Some(FileAction::Create)
        } else if self.is_removal(path) {
            Some(FileAction::Remove)
        } else {
            None
        }
    }

    fn commit(&mut self, path: String, action: FileAction, content: String) {
        if let Some(previous) = self.action_for(&path) {
            if previous != action {
                self.record(ParseWarning::ConflictingOperation {
                    path: path.clone(),
                    previous,
                    current: action,
                });
                self.updates.retain(|b| b.path != path);
                self.creations.retain(|b| b.path != path);
                self.removals.retain(|p| p != &path);
            }
        }

        match action {
            FileAction::Update => upsert(&mut self.updates, path, content),
            FileAction::Create => upsert(&mut self.creations, path, content),
            FileAction::Remove => {
                if !self.is_removal(&path) {
                    self.removals.push(path);
                }
            }
        }
    }

    fn record(&mut self, warning: ParseWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

fn find_body<'a>(bodies: &'a [FileBody], path: &str) -> Option<&'a str> {
    bodies
        .iter()
        .find(|b| b.path == path)
        .map(|b| b.content.as_str())
}

/// Same-path commits replace the body but keep the first discovery position
fn upsert(bodies: &mut Vec<FileBody>, path: String, content: String) {
    match bodies.iter_mut().find(|b| b.path == path) {
        Some(existing) => existing.content = content,
        None => bodies.push(FileBody { path, content }),
    }
}

/// The block currently being accumulated
#[derive(Debug)]
struct OpenFile {
    path: String,
    action: FileAction,
    started_at: usize,
    body: String,
    ignored_lines: usize,
}

impl OpenFile {
    fn from_marker(marker: Marker, line: usize) -> Self {
        Self {
            path: marker.path,
            action: marker.action,
            started_at: line,
            body: String::new(),
            ignored_lines: 0,
        }
    }

    fn push(&mut self, raw_line: &str) {
        if self.action == FileAction::Remove {
            if !raw_line.trim().is_empty() {
                self.ignored_lines += 1;
            }
        } else {
            self.body.push_str(raw_line);
        }
    }
}

/// Line-oriented parser over a configurable marker set
#[derive(Debug, Clone)]
pub struct ResponseParser {
    markers: MarkerSet,
    separator: String,
    no_change_prefix: String,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(MarkerSet::standard())
    }
}

impl ResponseParser {
    pub fn new(markers: MarkerSet) -> Self {
        Self {
            markers,
            separator: DEFAULT_EXPLANATIONS_SEPARATOR.to_string(),
            no_change_prefix: DEFAULT_NO_CHANGE_PREFIX.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_no_change_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.no_change_prefix = prefix.into();
        self
    }

    /// Parse a complete response
    pub fn parse(&self, text: &str) -> ParseResult {
        let mut result = ParseResult::default();
        let mut open: Option<OpenFile> = None;
        let mut explanation: Option<String> = None;

        for (index, raw_line) in text.split_inclusive('\n').enumerate() {
            let line_no = index + 1;

            if let Some(captured) = explanation.as_mut() {
                captured.push_str(raw_line);
                if !raw_line.ends_with('\n') {
                    captured.push('\n');
                }
                continue;
            }

            let line = raw_line.trim_end_matches(['\n', '\r']);

            match self.markers.classify(line) {
                LineMatch::Marker(marker) if marker.role == MarkerRole::Start => {
                    if let Some(previous) = open.take() {
                        result.record(ParseWarning::UnexpectedStart {
                            line: line_no,
                            open_path: previous.path,
                            new_path: marker.path.clone(),
                        });
                    }
                    debug!(path = %marker.path, action = %marker.action, line = line_no, "file block opened");
                    open = Some(OpenFile::from_marker(marker, line_no));
                }
                LineMatch::Marker(marker) => match open.take() {
                    Some(file) => self.close(&mut result, file, &marker, line_no),
                    None => result.record(ParseWarning::UnmatchedEnd {
                        line: line_no,
                        path: marker.path,
                        action: marker.action,
                    }),
                },
                classified => {
                    if line.starts_with(&self.separator) {
                        if let Some(file) = open.take() {
                            result.record(ParseWarning::InterruptedByExplanations {
                                path: file.path,
                                line: file.started_at,
                            });
                        }
                        explanation = Some(String::new());
                        continue;
                    }

                    if let Some(path) = self.no_change_path(line) {
                        info!("response indicated no changes for file: {}", path);
                        result.no_changes.push(path);
                        continue;
                    }

                    if classified == LineMatch::Malformed {
                        result.record(ParseWarning::UnrecognizedMarker { line: line_no });
                    }

                    if let Some(file) = open.as_mut() {
                        file.push(raw_line);
                    }
                }
            }
        }

        if let Some(file) = open {
            result.record(ParseWarning::UnterminatedFile {
                path: file.path,
                line: file.started_at,
            });
        }

        result.explanation = explanation;
        result
    }

    fn close(&self, result: &mut ParseResult, file: OpenFile, end: &Marker, line_no: usize) {
        if file.path != end.path || file.action != end.action {
            result.record(ParseWarning::MarkerMismatch {
                line: line_no,
                start_path: file.path.clone(),
                start_action: file.action,
                end_path: end.path.clone(),
                end_action: end.action,
            });
        }

        if file.action == FileAction::Remove && file.ignored_lines > 0 {
            result.record(ParseWarning::RemoveWithContent {
                path: file.path.clone(),
                lines: file.ignored_lines,
            });
        }

        let content = file.body.trim_end_matches(['\n', '\r']).to_string();
        debug!(path = %file.path, action = %file.action, bytes = content.len(), "file block committed");
        result.commit(file.path, file.action, content);
    }

    fn no_change_path(&self, line: &str) -> Option<String> {
        let rest = line.strip_prefix(&self.no_change_prefix)?;
        let path = normalize_separators(rest);
        (!path.is_empty()).then_some(path)
    }
}

/// Parse with the built-in marker syntaxes
#[cfg(test)]
pub(crate) fn parse_response(text: &str) -> ParseResult {
    ResponseParser::default().parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::markers::MarkerSyntax;

    #[test]
    fn test_create_scenario() {
        let input = "//--- START FILE: src/A.java (JAVA) - CREATE ---\nclass A {}\n//--- END FILE: src/A.java - CREATE ---";
        let result = parse_response(input);

        assert_eq!(result.creation("src/A.java"), Some("class A {}"));
        assert!(result.updates.is_empty());
        assert!(result.removals.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_well_formed_blocks_of_each_kind() {
        let input = r#"Here are the changes.
//--- START FILE: src/A.java (JAVA) - UPDATE ---
class A {

    int x;
}


//--- END FILE: src/A.java - UPDATE ---
<!----- START FILE: pom.xml (XML) - CREATE --- -->
<project/>
<!----- END FILE: pom.xml - CREATE --- -->
//--- START FILE: src/Old.java (JAVA) - REMOVE ---
//--- END FILE: src/Old.java - REMOVE ---
"#;
        let result = parse_response(input);

        assert_eq!(result.update("src/A.java"), Some("class A {\n\n    int x;\n}"));
        assert_eq!(result.creation("pom.xml"), Some("<project/>"));
        assert_eq!(result.removals, vec!["src/Old.java".to_string()]);
        assert_eq!(result.operation_count(), 3);
        assert!(result.warnings.is_empty());
        assert_eq!(result.explanation, None);
    }

    #[test]
    fn test_syntaxes_are_interchangeable() {
        let input = "<!----- START FILE: a.xml (XML) - UPDATE --- -->\n<a/>\n//--- END FILE: a.xml - UPDATE ---\n";
        let result = parse_response(input);
        assert_eq!(result.update("a.xml"), Some("<a/>"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unterminated_file_is_dropped() {
        let input = "//--- START FILE: src/A.java (JAVA) - UPDATE ---\nclass A {}\n";
        let result = parse_response(input);

        assert!(!result.has_operations());
        assert_eq!(
            result.warnings,
            vec![ParseWarning::UnterminatedFile {
                path: "src/A.java".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_markers_after_separator_are_text() {
        let input = "### EXPLANATIONS ###\nI changed A.\n//--- START FILE: src/A.java (JAVA) - UPDATE ---\nclass A {}\n//--- END FILE: src/A.java - UPDATE ---\nNo changes to: src/B.java";
        let result = parse_response(input);

        assert!(!result.has_operations());
        assert!(result.no_changes.is_empty());
        let explanation = result.explanation.unwrap();
        assert!(explanation.starts_with("I changed A.\n//--- START FILE"));
        assert!(explanation.ends_with("No changes to: src/B.java\n"));
    }

    #[test]
    fn test_separator_interrupts_open_file() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\nx\n### EXPLANATIONS ###\nwhy\n";
        let result = parse_response(input);

        assert!(!result.has_operations());
        assert_eq!(result.explanation.as_deref(), Some("why\n"));
        assert!(matches!(
            result.warnings[0],
            ParseWarning::InterruptedByExplanations { .. }
        ));
    }

    #[test]
    fn test_empty_explanation_section() {
        let result = parse_response("No changes to: a.java\n### EXPLANATIONS ###\n");
        assert_eq!(result.explanation.as_deref(), Some(""));
    }

    #[test]
    fn test_remove_discards_body() {
        let input = "//--- START FILE: src/Old.java (JAVA) - REMOVE ---\nclass Old {}\n\n//--- END FILE: src/Old.java - REMOVE ---\n";
        let result = parse_response(input);

        assert_eq!(result.removals, vec!["src/Old.java".to_string()]);
        assert!(result.update("src/Old.java").is_none());
        assert_eq!(
            result.warnings,
            vec![ParseWarning::RemoveWithContent {
                path: "src/Old.java".into(),
                lines: 1
            }]
        );
    }

    #[test]
    fn test_no_change_notice_only() {
        let result = parse_response("No changes to: src/B.java");
        assert!(!result.has_operations());
        assert_eq!(result.no_changes, vec!["src/B.java".to_string()]);
    }

    #[test]
    fn test_no_change_inside_block_is_not_content() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\nline1\nNo changes to: b.java\nline2\n//--- END FILE: a.java - UPDATE ---\n";
        let result = parse_response(input);
        assert_eq!(result.update("a.java"), Some("line1\nline2"));
        assert_eq!(result.no_changes, vec!["b.java".to_string()]);
    }

    #[test]
    fn test_bare_no_change_prefix_is_content() {
        let input = "//--- START FILE: a.txt (TXT) - UPDATE ---\nNo changes to: \n//--- END FILE: a.txt - UPDATE ---\n";
        let result = parse_response(input);
        assert_eq!(result.update("a.txt"), Some("No changes to: "));
        assert!(result.no_changes.is_empty());
    }

    #[test]
    fn test_start_before_end_discards_previous() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\nlost\n//--- START FILE: b.java (JAVA) - UPDATE ---\nkept\n//--- END FILE: b.java - UPDATE ---\n";
        let result = parse_response(input);

        assert!(result.update("a.java").is_none());
        assert_eq!(result.update("b.java"), Some("kept"));
        assert_eq!(
            result.warnings,
            vec![ParseWarning::UnexpectedStart {
                line: 3,
                open_path: "a.java".into(),
                new_path: "b.java".into()
            }]
        );
    }

    #[test]
    fn test_end_without_start() {
        let result = parse_response("text\n//--- END FILE: a.java - UPDATE ---\n");
        assert!(!result.has_operations());
        assert!(matches!(
            result.warnings[0],
            ParseWarning::UnmatchedEnd { line: 2, .. }
        ));
    }

    #[test]
    fn test_mismatch_commits_with_start_values() {
        let input = "//--- START FILE: a.java (JAVA) - CREATE ---\nbody\n//--- END FILE: b.java - UPDATE ---\n";
        let result = parse_response(input);

        assert_eq!(result.creation("a.java"), Some("body"));
        assert!(result.update("b.java").is_none());
        assert!(matches!(
            result.warnings[0],
            ParseWarning::MarkerMismatch {
                start_action: FileAction::Create,
                end_action: FileAction::Update,
                ..
            }
        ));
    }

    #[test]
    fn test_separator_styles_collide() {
        let input = "//--- START FILE: src\\A.java (JAVA) - UPDATE ---\nv1\n//--- END FILE: src\\A.java - UPDATE ---\n//--- START FILE: ./src/A.java (JAVA) - UPDATE ---\nv2\n//--- END FILE: src/A.java - UPDATE ---\n";
        let result = parse_response(input);

        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.update("src/A.java"), Some("v2"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_conflicting_actions_last_wins() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\nx\n//--- END FILE: a.java - UPDATE ---\n//--- START FILE: a.java (JAVA) - REMOVE ---\n//--- END FILE: a.java - REMOVE ---\n";
        let result = parse_response(input);

        assert!(result.updates.is_empty());
        assert_eq!(result.removals, vec!["a.java".to_string()]);
        assert_eq!(result.action_for("a.java"), Some(FileAction::Remove));
        assert!(matches!(
            result.warnings[0],
            ParseWarning::ConflictingOperation {
                previous: FileAction::Update,
                current: FileAction::Remove,
                ..
            }
        ));
    }

    #[test]
    fn test_repeated_update_keeps_first_position() {
        let input = "//--- START FILE: a (T) - UPDATE ---\n1\n//--- END FILE: a - UPDATE ---\n//--- START FILE: b (T) - UPDATE ---\n2\n//--- END FILE: b - UPDATE ---\n//--- START FILE: a (T) - UPDATE ---\n3\n//--- END FILE: a - UPDATE ---\n";
        let result = parse_response(input);

        let paths: Vec<_> = result.updates.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(result.update("a"), Some("3"));
    }

    #[test]
    fn test_crlf_line_endings_preserved() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\r\nline1\r\n\r\n  line2\r\n\r\n//--- END FILE: a.java - UPDATE ---\r\n";
        let result = parse_response(input);
        assert_eq!(result.update("a.java"), Some("line1\r\n\r\n  line2"));
    }

    #[test]
    fn test_leading_whitespace_and_blank_lines_preserved() {
        let input = "//--- START FILE: a.py (PY) - UPDATE ---\n\n    indented\n\n\tx\n//--- END FILE: a.py - UPDATE ---\n";
        let result = parse_response(input);
        assert_eq!(result.update("a.py"), Some("\n    indented\n\n\tx"));
    }

    #[test]
    fn test_malformed_marker_becomes_content() {
        let input = "//--- START FILE: a.java (JAVA) - UPDATE ---\n//--- START FILE: nested.java (JAVA) ---\n//--- END FILE: a.java - UPDATE ---\n";
        let result = parse_response(input);

        assert_eq!(
            result.update("a.java"),
            Some("//--- START FILE: nested.java (JAVA) ---")
        );
        assert_eq!(
            result.warnings,
            vec![ParseWarning::UnrecognizedMarker { line: 2 }]
        );
    }

    #[test]
    fn test_prose_outside_blocks_ignored() {
        let input = "Sure! Here you go:\n\n//--- START FILE: a (T) - UPDATE ---\nx\n//--- END FILE: a - UPDATE ---\nHope this helps.\n";
        let result = parse_response(input);
        assert_eq!(result.update("a"), Some("x"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_custom_separator_and_syntax() {
        let markers = MarkerSet::new(&[MarkerSyntax::new("hash", "#---", "---")]).unwrap();
        let parser = ResponseParser::new(markers)
            .with_separator("== NOTES ==")
            .with_no_change_prefix("Unchanged: ");

        let input = "#--- START FILE: run.sh (SH) - CREATE ---\necho hi\n#--- END FILE: run.sh - CREATE ---\nUnchanged: x.sh\n== NOTES ==\ndone\n";
        let result = parser.parse(input);

        assert_eq!(result.creation("run.sh"), Some("echo hi"));
        assert_eq!(result.no_changes, vec!["x.sh".to_string()]);
        assert_eq!(result.explanation.as_deref(), Some("done\n"));
    }

    #[test]
    fn test_empty_input() {
        let result = parse_response("");
        assert_eq!(result, ParseResult::default());
    }

    #[test]
    fn test_warning_serializes_with_type_tag() {
        let warning = ParseWarning::UnrecognizedMarker { line: 4 };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["type"], "unrecognized_marker");
        assert_eq!(json["line"], 4);
    }
}
