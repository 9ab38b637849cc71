//! retrace pipeline driver
//!
//! Chains method-table resolution, trace completion, optional comparison
//! against an earlier trace, and return-value extrapolation over the files of
//! a trace directory.

#![warn(missing_docs)]
#![warn(clippy::all)]

use regex::Regex;
use retrace_core::CoreError;
use retrace_log::{
    load_completed, read_lines, read_records, write_records, RecordWriter, ResolveError,
    SourceCache, SourceResolver, StreamError,
};
use retrace_replay::{
    extrapolate, AlignConfig, AlignError, AlignStats, CompletionConfig, CompletionEngine,
    CompletionError, CompletionSummary, ExtrapolateError, Location, Navigator, TraceAligner,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Raw tracer events
pub const METHOD_CALLS: &str = "MethodCalls.txt";
/// Raw method table
pub const METHOD_IDS: &str = "MethodIDs.txt";
/// Resolved method table
pub const COMPLETED_METHOD_IDS: &str = "CompletedMethodIDs.txt";
/// Completed trace before comparison and extrapolation
pub const PRETRACE: &str = "pretrace.txt";
/// Pretrace annotated by comparison
pub const PROCESSED_PRETRACE: &str = "processed_pretrace.txt";
/// Final trace
pub const TRACE: &str = "trace.txt";
/// Directory of copied sources inside a trace directory
pub const SOURCES: &str = "src";

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading or writing a trace file failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Method table resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The raw trace is malformed
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Comparison failed
    #[error(transparent)]
    Align(#[from] AlignError),

    /// Extrapolation failed
    #[error(transparent)]
    Extrapolate(#[from] ExtrapolateError),

    /// Core failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid function pattern
    #[error("invalid function pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Buffered output could not be flushed
    #[error("failed to flush {path}: {source}")]
    Flush {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Inputs of a `complete` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOptions {
    /// Directory holding the raw trace; outputs are written here too
    pub trace_dir: PathBuf,
    /// Colon-separated source roots
    pub src_roots: String,
    /// Earlier trace directory to compare against
    pub comparison_dir: Option<PathBuf>,
    /// File the comparison statistics are appended to
    pub stats_path: PathBuf,
    /// Completion settings
    pub completion: CompletionConfig,
    /// Alignment settings
    pub align: AlignConfig,
}

impl CompleteOptions {
    /// Options with default statistics file and engine settings
    #[must_use]
    pub fn new(trace_dir: impl Into<PathBuf>, src_roots: impl Into<String>) -> Self {
        Self {
            trace_dir: trace_dir.into(),
            src_roots: src_roots.into(),
            comparison_dir: None,
            stats_path: PathBuf::from(retrace_replay::DEFAULT_STATS_FILE),
            completion: CompletionConfig::default(),
            align: AlignConfig::default(),
        }
    }

    /// Compare against an earlier trace directory
    #[must_use]
    pub fn with_comparison(mut self, dir: impl Into<PathBuf>) -> Self {
        self.comparison_dir = Some(dir.into());
        self
    }

    /// Append statistics to `path`
    #[must_use]
    pub fn with_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = path.into();
        self
    }

    /// Set alignment settings
    #[must_use]
    pub fn with_align(mut self, config: AlignConfig) -> Self {
        self.align = config;
        self
    }
}

/// What a `complete` run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReport {
    /// Methods in the table
    pub methods: usize,
    /// Methods left unresolved
    pub unresolved: usize,
    /// Completion counters
    pub completion: CompletionSummary,
    /// Comparison statistics, when compared
    pub alignment: Option<AlignStats>,
    /// Records in the final trace
    pub trace_records: usize,
}

/// Resolve, complete, optionally compare, and extrapolate one trace directory
///
/// # Errors
///
/// Returns the first failing phase's error
pub fn run_complete(options: &CompleteOptions) -> Result<CompleteReport, PipelineError> {
    let dir = &options.trace_dir;

    let resolver = SourceResolver::new(&options.src_roots, dir);
    let resolved = resolver.resolve_all(&read_lines(&dir.join(METHOD_IDS))?)?;
    write_lines(&dir.join(COMPLETED_METHOD_IDS), &resolved.completed)?;
    info!(
        methods = resolved.table.len(),
        unresolved = resolved.unresolved,
        "method table resolved"
    );

    let sources = SourceCache::new();
    let events = read_lines(&dir.join(METHOD_CALLS))?;
    let pretrace_path = dir.join(PRETRACE);
    let mut writer = RecordWriter::create(&pretrace_path)?;
    let completion = CompletionEngine::new(&resolved.table, &sources)
        .with_config(options.completion)
        .complete(&events, &mut writer)?;
    writer.finish().map_err(|source| PipelineError::Flush {
        path: pretrace_path.display().to_string(),
        source,
    })?;
    info!(events = completion.events, records = completion.records, "pretrace written");

    let mut pretrace = read_records(&pretrace_path)?;
    let mut alignment = None;
    if let Some(comparison) = &options.comparison_dir {
        let reference_resolver = SourceResolver::from_roots([comparison.join(SOURCES)], comparison);
        let reference =
            reference_resolver.resolve_all(&read_lines(&comparison.join(METHOD_IDS))?)?;
        let reference_pretrace = read_records(&comparison.join(PRETRACE))?;

        let outcome = TraceAligner::new(&resolved.table, &reference.table, &sources)
            .with_config(options.align)
            .align(&pretrace, &reference_pretrace)?;
        write_records(&dir.join(PROCESSED_PRETRACE), &outcome.records)?;
        outcome.stats.append_to(&options.stats_path)?;
        alignment = Some(outcome.stats);
        pretrace = outcome.records;
    }

    let trace = extrapolate(&pretrace)?;
    write_records(&dir.join(TRACE), &trace)?;
    info!(records = trace.len(), "trace completion succeeded");

    Ok(CompleteReport {
        methods: resolved.table.len(),
        unresolved: resolved.unresolved,
        completion,
        alignment,
        trace_records: trace.len(),
    })
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), PipelineError> {
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(path, text).map_err(|source| PipelineError::Flush {
        path: path.display().to_string(),
        source,
    })
}

/// Cursor movements for `inspect`, applied in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOptions {
    /// Jump to the first method whose name matches
    pub function: Option<String>,
    /// Jump past the nearest divergence annotation
    pub divergence: bool,
    /// Move by this many executed blocks
    pub blocks: Option<usize>,
    /// Move by this many lines
    pub steps: Option<usize>,
    /// Search and move backwards
    pub reverse: bool,
}

/// Where `inspect` ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReport {
    /// Positions in the trace
    pub positions: usize,
    /// Whether any movement succeeded
    pub moved: bool,
    /// Final location
    pub location: Option<Location>,
    /// Open frames at the final location, outermost first
    pub call_stack: Vec<usize>,
}

/// Navigate the final trace of a completed trace directory
///
/// # Errors
///
/// Returns an error if the trace or method table cannot be read, or the
/// function pattern is invalid
pub fn run_inspect(trace_dir: &Path, options: &InspectOptions) -> Result<InspectReport, PipelineError> {
    let table = load_completed(&trace_dir.join(COMPLETED_METHOD_IDS), trace_dir)?;
    let records = read_records(&trace_dir.join(TRACE))?;
    let mut navigator = Navigator::new(&records, &table);

    let mut moved = false;
    if let Some(function) = &options.function {
        let pattern = Regex::new(function)?;
        moved |= navigator.move_to_function(&pattern, options.reverse);
    }
    if options.divergence {
        moved |= navigator.move_to_divergence(options.reverse);
    }
    if let Some(blocks) = options.blocks {
        for _ in 0..blocks {
            if !navigator.move_to_block(options.reverse) {
                break;
            }
            moved = true;
        }
    }
    if let Some(steps) = options.steps {
        let steps = isize::try_from(steps).unwrap_or(isize::MAX);
        moved |= navigator.move_by(if options.reverse { -steps } else { steps });
    }

    Ok(InspectReport {
        positions: navigator.len(),
        moved,
        location: navigator.location(),
        call_stack: navigator.call_stack(),
    })
}
