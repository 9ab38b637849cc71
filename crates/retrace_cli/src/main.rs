//! retrace CLI
//!
//! Completes raw execution traces, compares them against earlier runs and
//! navigates the results.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use retrace_cli::{run_complete, run_inspect, CompleteOptions, InspectOptions};
use retrace_replay::{AlignConfig, CompletionConfig, DEFAULT_STATS_FILE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "retrace - execution trace completion and comparison", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete a raw trace, optionally comparing it to an earlier one
    Complete {
        /// Directory holding MethodCalls.txt and MethodIDs.txt
        trace_dir: PathBuf,
        /// Colon-separated roots of the instrumented sources
        src_roots: String,
        /// Earlier trace directory to compare against
        comparison_dir: Option<PathBuf>,
        /// Annotate argument and return value differences
        #[arg(short, long)]
        verbose: bool,
        /// File comparison statistics are appended to
        #[arg(long, default_value = DEFAULT_STATS_FILE)]
        stats: PathBuf,
        /// Log the call stack after every event
        #[arg(long)]
        trace_stack: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Navigate a completed trace
    Inspect {
        /// Completed trace directory
        trace_dir: PathBuf,
        /// Jump to the first method whose name matches this pattern
        #[arg(short, long)]
        function: Option<String>,
        /// Jump past the nearest divergence
        #[arg(short, long)]
        divergence: bool,
        /// Move by this many executed blocks
        #[arg(short, long)]
        blocks: Option<usize>,
        /// Move by this many lines
        #[arg(short, long)]
        steps: Option<usize>,
        /// Search and move backwards
        #[arg(short, long)]
        reverse: bool,
        /// Print the location as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retrace=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Complete {
            trace_dir,
            src_roots,
            comparison_dir,
            verbose,
            stats,
            trace_stack,
            json,
        } => {
            let mut options = CompleteOptions::new(trace_dir, src_roots)
                .with_stats_path(stats)
                .with_align(AlignConfig::default().with_verbose(verbose));
            options.completion = CompletionConfig::default().with_trace_stack(trace_stack);
            if let Some(dir) = comparison_dir {
                options = options.with_comparison(dir);
            }
            let report = run_complete(&options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(stats) = report.alignment {
                println!(
                    "{} divergences, total drift {}",
                    stats.divergences, stats.total_drift
                );
            }
            Ok(())
        }
        Commands::Inspect {
            trace_dir,
            function,
            divergence,
            blocks,
            steps,
            reverse,
            json,
        } => {
            let options = InspectOptions {
                function,
                divergence,
                blocks,
                steps,
                reverse,
            };
            let report = run_inspect(&trace_dir, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            match &report.location {
                Some(location) => {
                    println!(
                        "{} at {}:{} (depth {})",
                        location.method.as_deref().unwrap_or("<top level>"),
                        location
                            .file
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "null".to_string()),
                        location.line,
                        location.depth
                    );
                    let stack: Vec<String> =
                        report.call_stack.iter().map(ToString::to_string).collect();
                    println!("stack: {}", stack.join(" > "));
                }
                None => println!("trace has no source positions"),
            }
            Ok(())
        }
    }
}
