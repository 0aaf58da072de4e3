mod cli;
mod config;
mod context;
mod logging;
mod paths;
mod process;
mod response;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cli::{ApplyOptions, ContextDestination, OutputMode};
use config::RoundtripConfig;

#[derive(Parser)]
#[command(name = "roundtrip")]
#[command(about = "Turn a source tree into LLM context and apply the model's file edits back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only report errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Output format: console, json or quiet
    #[arg(long, global = true, default_value = "console")]
    output: OutputMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine a source tree into one marked-up context file
    Context {
        /// Directory to scan
        source_dir: PathBuf,

        /// Output file (default: <SOURCE_DIR>/context.txt)
        #[arg(id = "output_file", value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Print the context to stdout instead of writing a file
        #[arg(long, conflicts_with = "output_file")]
        stdout: bool,

        /// File extension to include (repeatable; replaces the configured list)
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Directory name to skip (repeatable; replaces the configured list)
        #[arg(long = "exclude-dir")]
        exclude_dirs: Vec<String>,

        /// Keep markup files exactly as they are on disk
        #[arg(long)]
        no_format_markup: bool,

        /// Keep the XML declaration when formatting markup
        #[arg(long)]
        keep_declaration: bool,

        /// Concatenate files without START/END markers
        #[arg(long)]
        no_markers: bool,

        /// Remove blank lines from the output
        #[arg(long)]
        strip_blank_lines: bool,
    },

    /// Apply a saved model response to a project
    Apply {
        /// File containing the model response
        response_file: PathBuf,

        /// Project root the response paths are relative to (defaults to current)
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Save explanations here instead of printing them
        #[arg(long)]
        explanations_output: Option<PathBuf>,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Run the build after applying
        #[arg(long, conflicts_with = "no_build")]
        build: bool,

        /// Skip the build even if enabled in config
        #[arg(long)]
        no_build: bool,

        /// Build command line with shell-style quoting, e.g. "mvn -q compile" (implies --build)
        #[arg(long)]
        build_command: Option<String>,

        /// Build timeout in seconds (0 disables)
        #[arg(long)]
        build_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let log_guard = logging::init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;
    let handler = cli::create_handler(args.output, args.verbose);

    let code = match args.command {
        Commands::Context {
            source_dir,
            output,
            stdout,
            extensions,
            exclude_dirs,
            no_format_markup,
            keep_declaration,
            no_markers,
            strip_blank_lines,
        } => {
            let mut config = RoundtripConfig::load(Some(&source_dir))?.context;
            if !extensions.is_empty() {
                config.extensions = extensions;
            }
            if !exclude_dirs.is_empty() {
                config.exclude_dirs = exclude_dirs;
            }
            config.format_markup &= !no_format_markup;
            config.strip_declaration &= !keep_declaration;
            config.markers &= !no_markers;
            config.strip_blank_lines |= strip_blank_lines;

            let destination = ContextDestination::resolve(&source_dir, output, stdout, &config);
            cli::run_context(&source_dir, destination, &config, &*handler)?
        }

        Commands::Apply {
            response_file,
            project_dir,
            explanations_output,
            dry_run,
            build,
            no_build,
            build_command,
            build_timeout,
        } => {
            let mut config = RoundtripConfig::load(Some(&project_dir))?;

            let command_given = build_command.is_some();
            if let Some(command_line) = build_command {
                config.build.set_command_line(&command_line)?;
            }
            if let Some(timeout) = build_timeout {
                config.build.timeout = timeout;
            }

            let run_build = !no_build && (build || command_given || config.build.enabled);
            let options = ApplyOptions {
                project_dir,
                explanations_output: explanations_output
                    .or_else(|| config.response.expanded_explanations_file()),
                dry_run,
                build: run_build,
            };

            cli::run_apply(&response_file, &options, &config, &*handler).await?
        }
    };

    drop(log_guard);
    std::process::exit(code);
}
