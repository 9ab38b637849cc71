//! Trace alignment.
//!
//! Walks a *current* pretrace against a *reference* pretrace of a similar
//! execution. Records are copied to the output while both sides agree; at the
//! first disagreement a `*` annotation is written and the aligner searches
//! forward for a point where the traces line up again, at the same call
//! depth, shifting the index offset between the two sides accordingly.
//!
//! Depth is measured before a record is applied on both sides: a call sits at
//! its caller's depth, a return at the depth of the frame it closes.

use crate::config::AlignConfig;
use crate::stats::AlignStats;
use retrace_core::{CoreError, Interval, MethodRecord, MethodTable, SourceProvider};
use retrace_log::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Annotation texts written into the aligned output
pub mod annotation {
    /// Reference trace ended first
    pub const CONTINUING: &str = "Continuing past previous execution";
    /// Call against a non-call
    pub const CALL_ORDER: &str = "Difference in method call order";
    /// Calls to different methods
    pub const CALL: &str = "Difference in method call";
    /// Return against a non-return
    pub const RETURN_ORDER: &str = "Difference in return order";
    /// Interval against a non-interval
    pub const BLOCK_EXECUTIONS: &str = "Difference in basic block executions";
    /// Intervals with different source text
    pub const BLOCK_CONTENT: &str = "Difference in basic block content";
    /// Realigned on a call
    pub const RECONVERGED_CALL: &str = "Reconvergence, like function call";
    /// Realigned on a return
    pub const RECONVERGED_RETURN: &str = "Reconvergence, return";
    /// Realigned on an interval
    pub const RECONVERGED_BLOCK: &str = "Reconvergence, basic block match";
    /// Nothing matched before the frame ended
    pub const NO_RECONVERGENCE: &str = "No reconvergence point found";
    /// Verbose argument note prefix
    pub const ARGUMENTS_WERE: &str = "Arguments were previously:";
    /// Verbose return value note prefix
    pub const RETURN_WAS: &str = "Return value was previously:";
}

/// Which trace a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Trace being examined
    Current,
    /// Trace compared against
    Reference,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Alignment errors
#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    /// Inputs must be pretraces, not aligned output
    #[error("{side} trace already contains an annotation at record {index}")]
    Annotated {
        /// Offending trace
        side: Side,
        /// 0-based record index
        index: usize,
    },

    /// Unknown method id or unreadable source
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Shadow stack entry mirroring one frame of one trace
#[derive(Debug, Clone)]
pub struct ShadowFrame {
    /// Method of the frame
    pub method: Arc<MethodRecord>,
    /// Last line known to be aligned in this frame
    pub reference_line: i64,
}

impl ShadowFrame {
    fn new(method: Arc<MethodRecord>) -> Self {
        let reference_line = method.start_line;
        Self {
            method,
            reference_line,
        }
    }
}

/// Result of aligning two traces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignOutcome {
    /// Annotated current trace
    pub records: Vec<Record>,
    /// Divergence statistics
    pub stats: AlignStats,
    /// Final current-to-reference index offset
    pub offset: i64,
}

/// Aligns a current pretrace against a reference pretrace
pub struct TraceAligner<'t, S: SourceProvider> {
    current: &'t MethodTable,
    reference: &'t MethodTable,
    source: S,
    config: AlignConfig,
}

impl<'t, S: SourceProvider> TraceAligner<'t, S> {
    /// Create an aligner over both sides' method tables
    pub fn new(current: &'t MethodTable, reference: &'t MethodTable, source: S) -> Self {
        Self {
            current,
            reference,
            source,
            config: AlignConfig::default(),
        }
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: AlignConfig) -> Self {
        self.config = config;
        self
    }

    /// Align `current` against `reference`
    ///
    /// # Errors
    ///
    /// Returns `Annotated` if either input already carries annotations, or
    /// `Core` for unknown method ids and unreadable sources
    pub fn align(&self, current: &[Record], reference: &[Record]) -> Result<AlignOutcome, AlignError> {
        reject_annotations(current, Side::Current)?;
        reject_annotations(reference, Side::Reference)?;

        let mut run = Alignment::new(self, current, reference);
        let mut stats = AlignStats::default();

        while run.index < run.current.len() {
            if !run.find_divergence()? {
                break;
            }
            // one per divergence annotation, even when the very next record
            // reconverges
            stats.divergences += 1;
            let before = run.offset;
            run.find_reconvergence()?;
            stats.total_drift += run.offset.abs_diff(before);
        }

        info!(
            divergences = stats.divergences,
            drift = stats.total_drift,
            offset = run.offset,
            "alignment finished"
        );
        Ok(AlignOutcome {
            records: run.out,
            stats,
            offset: run.offset,
        })
    }

    fn table(&self, side: Side) -> &MethodTable {
        match side {
            Side::Current => self.current,
            Side::Reference => self.reference,
        }
    }

    fn method(&self, side: Side, id: usize) -> Result<Arc<MethodRecord>, AlignError> {
        Ok(Arc::clone(self.table(side).lookup(id)?))
    }

    fn same_method(&self, current: usize, reference: usize) -> Result<bool, AlignError> {
        let current = self.method(Side::Current, current)?;
        let reference = self.method(Side::Reference, reference)?;
        Ok(current.identity() == reference.identity())
    }

    fn block_text(&self, frame: Option<&ShadowFrame>, range: Interval) -> Result<Option<Vec<String>>, AlignError> {
        match frame {
            Some(frame) if !frame.method.is_inert() => {
                Ok(Some(self.source.block_text(&frame.method, range)?))
            }
            _ => Ok(None),
        }
    }

    fn report(&self, message: &str, index: usize, reference_index: i64) {
        if self.config.print_divergence {
            info!(index, reference_index, "{}", message);
        } else {
            debug!(index, reference_index, "{}", message);
        }
    }
}

fn reject_annotations(records: &[Record], side: Side) -> Result<(), AlignError> {
    match records
        .iter()
        .position(|record| record.kind() == RecordKind::Annotation)
    {
        Some(index) => Err(AlignError::Annotated { side, index }),
        None => Ok(()),
    }
}

fn depth_change(record: &Record) -> i64 {
    match record.kind() {
        RecordKind::Call => 1,
        RecordKind::Return => -1,
        RecordKind::Interval | RecordKind::Annotation => 0,
    }
}

/// Mutable state of one alignment run
struct Alignment<'a, 't, S: SourceProvider> {
    aligner: &'a TraceAligner<'t, S>,
    /// Working copy; intervals are split in place on content divergence
    current: Vec<Record>,
    reference: &'a [Record],
    index: usize,
    offset: i64,
    current_stack: Vec<ShadowFrame>,
    reference_stack: Vec<ShadowFrame>,
    out: Vec<Record>,
}

impl<'a, 't, S: SourceProvider> Alignment<'a, 't, S> {
    fn new(aligner: &'a TraceAligner<'t, S>, current: &[Record], reference: &'a [Record]) -> Self {
        Self {
            aligner,
            current: current.to_vec(),
            reference,
            index: 0,
            offset: 0,
            current_stack: Vec::new(),
            reference_stack: Vec::new(),
            out: Vec::with_capacity(current.len()),
        }
    }

    fn reference_index(&self, index: usize) -> i64 {
        index as i64 + self.offset
    }

    fn reference_at(&self, index: usize) -> Option<&Record> {
        usize::try_from(self.reference_index(index))
            .ok()
            .and_then(|at| self.reference.get(at))
    }

    fn copy_rest(&mut self) {
        self.out.extend(self.current[self.index..].iter().cloned());
        self.index = self.current.len();
    }

    fn diverge(&mut self, text: &str) {
        self.aligner
            .report(text, self.index, self.reference_index(self.index));
        self.out.push(Record::Divergence(text.to_string()));
    }

    /// Copy agreeing records; returns whether a divergence stopped the walk
    fn find_divergence(&mut self) -> Result<bool, AlignError> {
        debug!(index = self.index, offset = self.offset, "searching for divergence");
        while self.index < self.current.len() {
            let Some(reference) = self.reference_at(self.index).cloned() else {
                self.aligner.report(
                    annotation::CONTINUING,
                    self.index,
                    self.reference_index(self.index),
                );
                self.out
                    .push(Record::Divergence(annotation::CONTINUING.to_string()));
                self.copy_rest();
                return Ok(false);
            };
            let record = self.current[self.index].clone();

            match (&record, &reference) {
                (
                    Record::Call {
                        method_id, args, ..
                    },
                    Record::Call {
                        method_id: reference_id,
                        args: reference_args,
                        ..
                    },
                ) => {
                    if !self.aligner.same_method(*method_id, *reference_id)? {
                        self.diverge(annotation::CALL);
                        return Ok(true);
                    }
                    if self.aligner.config.verbose && args != reference_args {
                        self.out.push(Record::Note(note(
                            annotation::ARGUMENTS_WERE,
                            reference_args,
                        )));
                    }
                    let current = self.aligner.method(Side::Current, *method_id)?;
                    let past = self.aligner.method(Side::Reference, *reference_id)?;
                    self.current_stack.push(ShadowFrame::new(current));
                    self.reference_stack.push(ShadowFrame::new(past));
                }
                (Record::Call { .. }, _) => {
                    self.diverge(annotation::CALL_ORDER);
                    return Ok(true);
                }
                (
                    Record::Return { values, .. },
                    Record::Return {
                        values: reference_values,
                        ..
                    },
                ) => {
                    if self.aligner.config.verbose && values != reference_values {
                        self.out.push(Record::Note(note(
                            annotation::RETURN_WAS,
                            reference_values,
                        )));
                    }
                    self.current_stack.pop();
                    self.reference_stack.pop();
                }
                (Record::Return { .. }, _) => {
                    self.diverge(annotation::RETURN_ORDER);
                    return Ok(true);
                }
                (Record::Interval(interval), Record::Interval(reference_interval)) => {
                    if let Some(split) = self.first_mismatch(*interval, *reference_interval)? {
                        if split > interval.start {
                            self.out
                                .push(Record::Interval(Interval::new(interval.start, split - 1)));
                        }
                        self.diverge(annotation::BLOCK_CONTENT);
                        self.current[self.index] = Record::Interval(Interval::new(split, interval.end));
                        return Ok(true);
                    }
                }
                (Record::Interval(_), _) => {
                    self.diverge(annotation::BLOCK_EXECUTIONS);
                    return Ok(true);
                }
                (Record::Divergence(_) | Record::Note(_), _) => {}
            }

            self.out.push(record);
            self.index += 1;
        }
        Ok(false)
    }

    /// First current line whose text differs from the reference; extra
    /// trailing reference lines are tolerated
    fn first_mismatch(&self, current: Interval, reference: Interval) -> Result<Option<i64>, AlignError> {
        let texts = (
            self.aligner.block_text(self.current_stack.last(), current)?,
            self.aligner.block_text(self.reference_stack.last(), reference)?,
        );
        let (Some(current_text), Some(reference_text)) = texts else {
            return Ok((current != reference).then_some(current.start));
        };
        Ok(current_text
            .iter()
            .zip(current.start..)
            .enumerate()
            .find(|(i, (line, _))| reference_text.get(*i) != Some(*line))
            .map(|(_, (_, line_no))| line_no))
    }

    /// Reference positions at the divergence depth, from the divergence
    /// point until that frame returns
    fn candidates(&self, depth: i64) -> Vec<usize> {
        let Ok(start) = usize::try_from(self.reference_index(self.index)) else {
            return Vec::new();
        };
        let mut level = depth;
        let mut found = Vec::new();
        for (at, record) in self.reference.iter().enumerate().skip(start) {
            if level < depth {
                break;
            }
            if level == depth {
                found.push(at);
            }
            level += depth_change(record);
        }
        found
    }

    /// Walk current until a record lines up with a candidate, or give up and
    /// copy the rest
    fn find_reconvergence(&mut self) -> Result<(), AlignError> {
        let depth = self.current_stack.len() as i64;
        let candidates = self.candidates(depth);
        debug!(
            index = self.index,
            depth,
            candidates = candidates.len(),
            "searching for reconvergence"
        );

        let start = self.index;
        let mut level = depth;
        while self.index < self.current.len() {
            if level < depth {
                break;
            }
            let record = self.current[self.index].clone();
            if level == depth {
                for &candidate in &candidates {
                    if let Some(text) = self.try_reconverge(&record, candidate)? {
                        let offset = candidate as i64 - self.index as i64;
                        info!(
                            index = self.index,
                            reference_index = candidate,
                            offset,
                            "{}",
                            text
                        );
                        self.offset = offset;
                        self.out.push(Record::Divergence(text.to_string()));
                        return Ok(());
                    }
                }
            }
            level += depth_change(&record);
            self.out.push(record);
            self.index += 1;
        }

        self.aligner.report(
            annotation::NO_RECONVERGENCE,
            self.index,
            self.reference_index(self.index),
        );
        self.out
            .push(Record::Divergence(annotation::NO_RECONVERGENCE.to_string()));
        self.copy_rest();
        self.offset += (self.current.len() - start) as i64;
        Ok(())
    }

    /// Whether `record` (at the current index) matches the reference
    /// candidate; rebases the shadow tops on a match
    fn try_reconverge(&mut self, record: &Record, candidate: usize) -> Result<Option<&'static str>, AlignError> {
        let reference_records = self.reference;
        let reference = &reference_records[candidate];
        match (record, reference) {
            (
                Record::Call { method_id, .. },
                Record::Call {
                    method_id: reference_id,
                    ..
                },
            ) => {
                if !self.aligner.same_method(*method_id, *reference_id)? {
                    return Ok(None);
                }
                let previous = self
                    .index
                    .checked_sub(1)
                    .and_then(|at| self.current[at].interval());
                let reference_previous = candidate
                    .checked_sub(1)
                    .and_then(|at| reference_records[at].interval());
                if let (Some(previous), Some(reference_previous)) = (previous, reference_previous) {
                    self.rebase(previous.end, reference_previous.end);
                }
                Ok(Some(annotation::RECONVERGED_CALL))
            }
            (
                Record::Return { method_id, .. },
                Record::Return {
                    method_id: reference_id,
                    ..
                },
            ) => {
                // a normal return never realigns with an exceptional one
                if record.is_exception() != reference.is_exception() {
                    return Ok(None);
                }
                if !self.aligner.same_method(*method_id, *reference_id)? {
                    return Ok(None);
                }
                Ok(Some(annotation::RECONVERGED_RETURN))
            }
            (Record::Interval(interval), Record::Interval(reference_interval)) => {
                let current_text = self
                    .aligner
                    .block_text(self.current_stack.last(), *interval)?;
                let reference_text = self
                    .aligner
                    .block_text(self.reference_stack.last(), *reference_interval)?;
                let same = match (current_text, reference_text) {
                    (Some(current_text), Some(reference_text)) => current_text == reference_text,
                    _ => interval == reference_interval,
                };
                if !same {
                    return Ok(None);
                }
                self.rebase(interval.start, reference_interval.start);
                Ok(Some(annotation::RECONVERGED_BLOCK))
            }
            _ => Ok(None),
        }
    }

    fn rebase(&mut self, current_line: i64, reference_line: i64) {
        if let Some(top) = self.current_stack.last_mut() {
            top.reference_line = current_line;
        }
        if let Some(top) = self.reference_stack.last_mut() {
            top.reference_line = reference_line;
        }
        debug!(current_line, reference_line, "rebased shadow frames");
    }
}

fn note(prefix: &str, tokens: &[String]) -> String {
    if tokens.is_empty() {
        prefix.to_string()
    } else {
        format!("{} {}", prefix, tokens.join(" "))
    }
}
