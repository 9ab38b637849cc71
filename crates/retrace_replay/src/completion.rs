//! Trace completion.
//!
//! Replays the raw call/return/block-change events against the method table
//! and fills in the source-line intervals executed between them, producing
//! the pretrace.

use crate::config::CompletionConfig;
use retrace_core::{CoreError, Interval, MethodRecord, MethodTable, SourceProvider};
use retrace_log::{Event, Record, RecordWriter, UNKNOWN_LINE};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Completion errors
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// The raw trace is inconsistent with itself or with the method table
    #[error("malformed trace at line {line_number} ({line:?}): {reason} [file: {path}, method: {method}]")]
    Malformed {
        /// 1-based line number in the raw trace
        line_number: usize,
        /// Raw event line
        line: String,
        /// Source file involved, if any
        path: String,
        /// Method involved, if any
        method: String,
        /// What went wrong
        reason: String,
    },

    /// Output could not be written
    #[error("failed to write pretrace: {0}")]
    Write(#[from] io::Error),

    /// Core failure outside event handling
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Position inside the method's current basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCursor {
    /// First line not yet reported
    pub start: i64,
    /// Last line of the current block
    pub end: i64,
    /// Column the next scan starts at
    pub char_offset: usize,
}

impl BlockCursor {
    const INERT: Self = Self {
        start: -1,
        end: -1,
        char_offset: 0,
    };

    fn range(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// One live method invocation
#[derive(Debug, Clone)]
pub struct Frame {
    /// Method id the frame was opened with
    pub method_id: usize,
    /// Shared method record, or a private inert copy
    pub method: Arc<MethodRecord>,
    /// Argument tokens of the call
    pub args: Vec<String>,
    /// Interval cursor
    pub cursor: BlockCursor,
}

impl Frame {
    fn open(method_id: usize, method: Arc<MethodRecord>, args: Vec<String>) -> Self {
        let cursor = if method.is_inert() {
            BlockCursor::INERT
        } else {
            let first = method.first_block();
            BlockCursor {
                start: first,
                end: method.end_of_block(first),
                char_offset: 0,
            }
        };
        Self {
            method_id,
            method,
            args,
            cursor,
        }
    }

    fn path(&self) -> String {
        self.method.source.to_string()
    }
}

/// Counters collected while completing a trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Raw events consumed
    pub events: usize,
    /// Call events
    pub calls: usize,
    /// Real returns
    pub returns: usize,
    /// Frames closed by a synthetic exception return
    pub exception_returns: usize,
    /// Block changes ignored because the method is inert
    pub ignored_block_changes: usize,
    /// Pretrace records produced
    pub records: usize,
}

/// Stack machine turning raw events into a pretrace
pub struct CompletionEngine<'t, S: SourceProvider> {
    table: &'t MethodTable,
    source: S,
    config: CompletionConfig,
    stack: Vec<Frame>,
    summary: CompletionSummary,
}

impl<'t, S: SourceProvider> CompletionEngine<'t, S> {
    /// Create an engine over a resolved method table
    pub fn new(table: &'t MethodTable, source: S) -> Self {
        Self {
            table,
            source,
            config: CompletionConfig::default(),
            stack: Vec::new(),
            summary: CompletionSummary::default(),
        }
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    /// Live frames, outermost first
    #[must_use]
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Counters so far
    #[must_use]
    pub fn summary(&self) -> CompletionSummary {
        self.summary
    }

    /// Complete a whole raw trace, writing records as each event is handled.
    /// Blank lines are skipped but still counted for line numbers.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for the first bad event (records of earlier events
    /// stay written) or `Write` if the writer fails
    pub fn complete<W: Write>(
        &mut self,
        lines: &[String],
        writer: &mut RecordWriter<W>,
    ) -> Result<CompletionSummary, CompletionError> {
        for (line_number, line) in numbered_events(lines) {
            let records = self.step(line_number, line)?;
            writer.write_all(&records)?;
        }
        writer.write_all(&self.finish())?;
        Ok(self.summary)
    }

    /// Complete a whole raw trace into memory
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for the first bad event
    pub fn complete_to_vec(&mut self, lines: &[String]) -> Result<Vec<Record>, CompletionError> {
        let mut out = Vec::new();
        for (line_number, line) in numbered_events(lines) {
            out.extend(self.step(line_number, line)?);
        }
        out.extend(self.finish());
        Ok(out)
    }

    /// Handle one raw line (1-based `line_number`), returning the records it
    /// produces
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the line does not parse or contradicts the stack
    pub fn step(&mut self, line_number: usize, line: &str) -> Result<Vec<Record>, CompletionError> {
        let event = Event::parse(line).map_err(|e| CompletionError::Malformed {
            line_number,
            line: line.to_string(),
            path: String::new(),
            method: String::new(),
            reason: e.to_string(),
        })?;
        let mut out = Vec::new();
        let ctx = EventContext { line_number, line };
        match event {
            Event::Call {
                invocation_line,
                method_id,
                args,
            } => self.on_call(&ctx, invocation_line, method_id, args, &mut out)?,
            Event::Return { method_id, payload } => {
                self.on_return(&ctx, method_id, payload, &mut out)?
            }
            Event::BlockChange {
                method_id,
                block_start,
            } => self.on_block_change(&ctx, method_id, block_start, &mut out)?,
        }
        self.summary.events += 1;
        self.summary.records += out.len();
        if self.config.trace_stack {
            debug!(line_number, stack = ?self.stack_ids(), "call stack");
        }
        Ok(out)
    }

    /// Close every remaining frame as exception-terminated, innermost first
    pub fn finish(&mut self) -> Vec<Record> {
        let mut out = Vec::new();
        if !self.stack.is_empty() {
            debug!(open = self.stack.len(), "trace ended with open frames");
        }
        while let Some(frame) = self.stack.pop() {
            self.close_exceptionally(frame, &mut out);
        }
        self.summary.records += out.len();
        out
    }

    fn on_call(
        &mut self,
        ctx: &EventContext<'_>,
        invocation_line: i64,
        method_id: usize,
        mut args: Vec<String>,
        out: &mut Vec<Record>,
    ) -> Result<(), CompletionError> {
        let mut method = self.resolve(ctx, method_id)?;
        if method.is_static_initializer() && invocation_line == UNKNOWN_LINE {
            method = Arc::new(method.with_unresolved_start());
            args.clear();
        }
        self.summary.calls += 1;
        let call = Record::call(method_id, args.clone());
        self.stack.push(Frame::open(method_id, method, args));

        let depth = self.stack.len();
        if depth == 1 || self.stack[depth - 2].method.is_inert() {
            out.push(call);
            return Ok(());
        }

        let caller = &mut self.stack[depth - 2];
        let begin = caller.cursor.start;
        let end = if invocation_line == UNKNOWN_LINE {
            begin
        } else {
            invocation_line
        };
        caller.cursor.start = end;
        caller.cursor.char_offset = 0;
        let range = if begin <= end {
            Interval::new(begin, end)
        } else {
            Interval::point(end)
        };
        let caller = &self.stack[depth - 2];
        let callee = &self.stack[depth - 1];
        let intervals = self.extract(ctx, caller, &callee.method, range)?;
        out.extend(intervals.into_iter().map(Record::Interval));
        out.push(call);
        Ok(())
    }

    fn on_return(
        &mut self,
        ctx: &EventContext<'_>,
        method_id: usize,
        payload: Vec<String>,
        out: &mut Vec<Record>,
    ) -> Result<(), CompletionError> {
        let Some(top) = self.stack.last() else {
            let method = self
                .table
                .get(method_id)
                .map_or_else(|| method_id.to_string(), ToString::to_string);
            let path = self
                .table
                .get(method_id)
                .map(|method| method.source.to_string())
                .unwrap_or_default();
            return Err(ctx.malformed(
                &path,
                &method,
                &format!("return from method {} with an empty call stack", method_id),
            ));
        };
        if top.method_id != method_id {
            warn!(
                line_number = ctx.line_number,
                returned = method_id,
                top = top.method_id,
                "return does not match the innermost frame"
            );
        }
        if !top.method.is_inert() {
            let intervals = self.extract(ctx, top, &top.method, top.cursor.range())?;
            out.extend(intervals.into_iter().map(Record::Interval));
        }
        out.push(Record::ret(method_id, payload));
        self.stack.pop();
        self.summary.returns += 1;
        Ok(())
    }

    fn on_block_change(
        &mut self,
        ctx: &EventContext<'_>,
        method_id: usize,
        block_start: i64,
        out: &mut Vec<Record>,
    ) -> Result<(), CompletionError> {
        let method = self.resolve(ctx, method_id)?;
        if method.is_inert() {
            self.summary.ignored_block_changes += 1;
            return Ok(());
        }

        loop {
            let Some(top) = self.stack.last() else {
                return Err(ctx.malformed(
                    &method.source.to_string(),
                    &method.to_string(),
                    "block change for a method that is not on the call stack",
                ));
            };
            if top.method_id == method_id {
                break;
            }
            if let Some(frame) = self.stack.pop() {
                debug!(line_number = ctx.line_number, unwound = frame.method_id, "unwinding frame");
                self.close_exceptionally(frame, out);
            }
        }

        let Some(top) = self.stack.last() else {
            return Ok(());
        };
        if top.method.is_inert() {
            return Ok(());
        }
        let intervals = self.extract(ctx, top, &top.method, top.cursor.range())?;
        out.extend(intervals.into_iter().map(Record::Interval));
        if let Some(top) = self.stack.last_mut() {
            top.cursor = BlockCursor {
                start: block_start,
                end: top.method.end_of_block(block_start),
                char_offset: 0,
            };
        }
        Ok(())
    }

    fn close_exceptionally(&mut self, frame: Frame, out: &mut Vec<Record>) {
        if !frame.method.is_inert() {
            out.push(Record::Interval(Interval::point(frame.cursor.start)));
        }
        out.push(Record::exception_return(frame.method_id));
        self.summary.exception_returns += 1;
    }

    fn resolve(
        &self,
        ctx: &EventContext<'_>,
        method_id: usize,
    ) -> Result<Arc<MethodRecord>, CompletionError> {
        self.table
            .lookup(method_id)
            .map(Arc::clone)
            .map_err(|e| ctx.malformed("", &method_id.to_string(), &e.to_string()))
    }

    /// Intervals of `range` in `frame`'s file; `involved` names the method in
    /// diagnostics
    fn extract(
        &self,
        ctx: &EventContext<'_>,
        frame: &Frame,
        involved: &MethodRecord,
        range: Interval,
    ) -> Result<Vec<Interval>, CompletionError> {
        let Some(path) = frame.method.source.as_path() else {
            return Ok(Vec::new());
        };
        self.source.code_intervals(path, range).map_err(|e| {
            ctx.malformed(
                &frame.path(),
                &involved.to_string(),
                &format!("{} while extracting {}", e, range),
            )
        })
    }

    fn stack_ids(&self) -> Vec<usize> {
        self.stack.iter().map(|frame| frame.method_id).collect()
    }
}

struct EventContext<'l> {
    line_number: usize,
    line: &'l str,
}

/// Non-blank lines with their 1-based line numbers
fn numbered_events(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, line.as_str()))
}

impl EventContext<'_> {
    fn malformed(&self, path: &str, method: &str, reason: &str) -> CompletionError {
        CompletionError::Malformed {
            line_number: self.line_number,
            line: self.line.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}
