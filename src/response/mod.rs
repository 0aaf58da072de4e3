//! Response handling for llm-roundtrip
//!
//! This module handles:
//! - Recognizing file markers in several comment syntaxes
//! - Scanning a model response into create/update/remove operations,
//!   no-change notices and explanation text
//! - Applying those operations under a project root
//! - Running an optional build afterward and persisting its report
//!
//! # Example
//!
//! ```ignore
//! use crate::response::{ChangeApplicator, ResponseParser};
//!
//! let parsed = ResponseParser::default().parse(&response_text);
//! let report = ChangeApplicator::new(project_root).apply(&parsed);
//!
//! for path in report.failed() {
//!     eprintln!("failed: {}", path);
//! }
//! ```

mod applier;
mod build;
mod markers;
mod parser;

#[allow(unused_imports)]
pub use applier::{ApplyReport, ChangeApplicator, FileOutcome, OutcomeStatus};
#[allow(unused_imports)]
pub use build::{
    BuildError, BuildOutcome, BuildOutput, BuildRunner, BuildStepResult, CommandBuildRunner,
    ReportSettings, run_build_step,
};
pub use markers::{FileAction, MarkerError, MarkerSet, MarkerSyntax};
#[allow(unused_imports)]
pub use parser::{
    DEFAULT_EXPLANATIONS_SEPARATOR, DEFAULT_NO_CHANGE_PREFIX, ParseResult, ParseWarning,
    ResponseParser,
};
