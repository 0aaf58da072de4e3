//! CLI module for llm-roundtrip
//!
//! This module provides:
//! - Command implementations (context, apply)
//! - Output handlers (console, JSON, quiet)
//!
//! # Example
//!
//! ```ignore
//! use crate::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let exit_code = commands::run_apply(&response, &options, &config, &*handler).await?;
//! ```

pub mod commands;
pub mod output;

pub use commands::{ApplyOptions, ContextDestination, run_apply, run_context};
pub use output::{OutputMode, create_handler};
