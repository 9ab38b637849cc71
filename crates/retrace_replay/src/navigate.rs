//! Cursor over a final trace.
//!
//! Every line of every interval record is one position. Calls and returns
//! are not positions themselves but change the call depth of the positions
//! that follow them.

use regex::Regex;
use retrace_core::{MethodTable, SourcePath};
use retrace_log::Record;
use serde::{Deserialize, Serialize};

/// One visible position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Index of the interval record in the trace
    pub record: usize,
    /// Source line
    pub line: i64,
    /// Number of open frames
    pub depth: usize,
    /// Innermost open method, if any
    pub method_id: Option<usize>,
}

/// Where the cursor currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Innermost method id
    pub method_id: Option<usize>,
    /// `Class.name` of the innermost method
    pub method: Option<String>,
    /// Source file of the innermost method
    pub file: Option<SourcePath>,
    /// Source line
    pub line: i64,
    /// Number of open frames
    pub depth: usize,
    /// Position index
    pub position: usize,
}

/// Cursor over the positions of a final trace
pub struct Navigator<'a> {
    records: &'a [Record],
    table: &'a MethodTable,
    steps: Vec<Step>,
    position: usize,
}

impl<'a> Navigator<'a> {
    /// Index the positions of `records`, starting at the first one
    #[must_use]
    pub fn new(records: &'a [Record], table: &'a MethodTable) -> Self {
        let mut steps = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match record {
                Record::Call { method_id, .. } => stack.push(*method_id),
                Record::Return { .. } => {
                    stack.pop();
                }
                Record::Interval(interval) => {
                    steps.extend((interval.start..=interval.end).map(|line| Step {
                        record: index,
                        line,
                        depth: stack.len(),
                        method_id: stack.last().copied(),
                    }));
                }
                Record::Divergence(_) | Record::Note(_) => {}
            }
        }
        Self {
            records,
            table,
            steps,
            position: 0,
        }
    }

    /// Number of positions
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trace has no positions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Current position index
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current step
    #[must_use]
    pub fn current(&self) -> Option<&Step> {
        self.steps.get(self.position)
    }

    /// Move by `n` positions, clamped to the trace
    pub fn move_by(&mut self, n: isize) -> bool {
        if self.steps.is_empty() {
            return false;
        }
        let last = self.steps.len() - 1;
        let target = self.position.saturating_add_signed(n).min(last);
        self.jump(target)
    }

    /// First line of the next (or previous) executed block
    pub fn move_to_block(&mut self, reverse: bool) -> bool {
        let Some(here) = self.current().map(|step| step.record) else {
            return false;
        };
        let target = if reverse {
            self.steps[..self.position]
                .iter()
                .rposition(|step| step.record < here)
                .map(|i| {
                    let record = self.steps[i].record;
                    self.steps.partition_point(|step| step.record < record)
                })
        } else {
            self.first_step_after(here)
        };
        target.is_some_and(|i| self.jump(i))
    }

    /// Next position in the same frame; stops early at a shallower one
    pub fn step_over(&mut self, reverse: bool) -> bool {
        let Some(depth) = self.current().map(|step| step.depth) else {
            return false;
        };
        let target = self
            .scan(reverse)
            .find(|&i| self.steps[i].depth <= depth);
        target.is_some_and(|i| self.jump(i))
    }

    /// Nearest deeper position, unless a shallower one comes first
    pub fn step_into(&mut self, reverse: bool) -> bool {
        let Some(depth) = self.current().map(|step| step.depth) else {
            return false;
        };
        let target = self
            .scan(reverse)
            .find(|&i| self.steps[i].depth != depth)
            .filter(|&i| self.steps[i].depth > depth);
        target.is_some_and(|i| self.jump(i))
    }

    /// First position in an enclosing frame
    pub fn step_out(&mut self, reverse: bool) -> bool {
        let Some(depth) = self.current().map(|step| step.depth) else {
            return false;
        };
        let target = self.scan(reverse).find(|&i| self.steps[i].depth < depth);
        target.is_some_and(|i| self.jump(i))
    }

    /// First position whose innermost method name matches `pattern`
    pub fn move_to_function(&mut self, pattern: &Regex, reverse: bool) -> bool {
        let target = self.scan(reverse).find(|&i| {
            self.steps[i]
                .method_id
                .and_then(|id| self.table.get(id))
                .is_some_and(|method| pattern.is_match(&method.name))
        });
        target.is_some_and(|i| self.jump(i))
    }

    /// First position after the nearest divergence annotation in the given
    /// direction
    pub fn move_to_divergence(&mut self, reverse: bool) -> bool {
        let Some(here) = self.current().copied() else {
            return false;
        };
        let divergences = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| matches!(record, Record::Divergence(_)))
            .map(|(index, _)| index);
        let target = if reverse {
            divergences
                .filter(|&index| index < here.record)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .filter_map(|index| self.first_step_after(index))
                .find(|&i| i < self.position)
        } else {
            divergences
                .filter(|&index| index >= here.record)
                .filter_map(|index| self.first_step_after(index))
                .find(|&i| i > self.position)
        };
        target.is_some_and(|i| self.jump(i))
    }

    /// Where the cursor is
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        let step = self.current()?;
        let method = step.method_id.and_then(|id| self.table.get(id));
        Some(Location {
            method_id: step.method_id,
            method: method.map(|m| format!("{}.{}", m.declaring_class, m.name)),
            file: method.map(|m| m.source.clone()),
            line: step.line,
            depth: step.depth,
            position: self.position,
        })
    }

    /// Method ids of the open frames at the cursor, outermost first
    #[must_use]
    pub fn call_stack(&self) -> Vec<usize> {
        let Some(step) = self.current() else {
            return Vec::new();
        };
        let mut stack = Vec::new();
        for record in &self.records[..step.record] {
            match record {
                Record::Call { method_id, .. } => stack.push(*method_id),
                Record::Return { .. } => {
                    stack.pop();
                }
                _ => {}
            }
        }
        stack
    }

    fn scan(&self, reverse: bool) -> Box<dyn Iterator<Item = usize>> {
        if reverse {
            Box::new((0..self.position).rev())
        } else {
            Box::new(self.position + 1..self.steps.len())
        }
    }

    fn first_step_after(&self, record: usize) -> Option<usize> {
        let i = self.steps.partition_point(|step| step.record <= record);
        (i < self.steps.len()).then_some(i)
    }

    fn jump(&mut self, target: usize) -> bool {
        let moved = target != self.position;
        self.position = target;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::MethodRecord;
    use retrace_log::parse_records;

    const TRACE: &str = "\
1 | Exception
[3,4]
2 7
[10,11]
- 2 7
[5,5]
* Difference in method call
3
[20,20]
- 3
[6,6]
- 1 | Exception
";

    fn table() -> MethodTable {
        vec![
            MethodRecord::new("main", "Main").with_source("Main.java").with_lines(1, 8),
            MethodRecord::new("helper", "Main").with_source("Main.java").with_lines(9, 12),
            MethodRecord::new("render", "View").with_source("View.java").with_lines(19, 21),
        ]
        .into_iter()
        .collect()
    }

    fn line_at(nav: &Navigator<'_>) -> i64 {
        nav.current().map(|step| step.line).unwrap_or_default()
    }

    #[test]
    fn test_positions() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let nav = Navigator::new(&records, &table);
        assert_eq!(nav.len(), 7);
        let depths: Vec<usize> = nav.steps.iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![1, 1, 2, 2, 1, 2, 1]);
    }

    #[test]
    fn test_move_by_clamps() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        assert!(!nav.move_by(-3));
        assert!(nav.move_by(2));
        assert_eq!(line_at(&nav), 10);
        assert!(nav.move_by(100));
        assert_eq!(nav.position(), 6);
        assert!(!nav.move_by(1));
    }

    #[test]
    fn test_step_over_and_into() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        nav.move_by(1);
        assert!(nav.step_over(false));
        assert_eq!(line_at(&nav), 5);
        assert!(nav.step_over(true));
        assert_eq!(line_at(&nav), 4);

        assert!(nav.step_into(false));
        assert_eq!(line_at(&nav), 10);
        // nothing deeper before the frame ends
        assert!(!nav.step_into(false));
        assert_eq!(line_at(&nav), 10);
    }

    #[test]
    fn test_move_to_block() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        assert!(!nav.move_to_block(true));
        assert!(nav.move_to_block(false));
        assert_eq!(line_at(&nav), 10);
        assert!(nav.move_to_block(false));
        assert_eq!(line_at(&nav), 5);
        assert!(nav.move_to_block(true));
        assert_eq!(line_at(&nav), 10);

        // from inside a block, back goes to the start of the one before
        nav.move_by(1);
        assert_eq!(line_at(&nav), 11);
        assert!(nav.move_to_block(true));
        assert_eq!(line_at(&nav), 3);

        nav.move_by(100);
        assert!(!nav.move_to_block(false));
    }

    #[test]
    fn test_step_out() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        nav.move_by(3);
        assert!(nav.step_out(false));
        assert_eq!(line_at(&nav), 5);
        assert!(!nav.step_out(false));
        nav.move_by(1);
        assert!(nav.step_out(true));
        assert_eq!(line_at(&nav), 5);
    }

    #[test]
    fn test_move_to_function() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        let pattern = Regex::new("^rend").unwrap();
        assert!(nav.move_to_function(&pattern, false));
        assert_eq!(line_at(&nav), 20);
        assert_eq!(nav.call_stack(), vec![1, 3]);
        let location = nav.location().unwrap();
        assert_eq!(location.method.as_deref(), Some("View.render"));
        assert_eq!(location.depth, 2);

        let helper = Regex::new("helper").unwrap();
        assert!(nav.move_to_function(&helper, true));
        assert_eq!(line_at(&nav), 11);
        assert!(!nav.move_to_function(&Regex::new("nothing").unwrap(), false));
    }

    #[test]
    fn test_move_to_divergence() {
        let records = parse_records(TRACE, "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        assert!(nav.move_to_divergence(false));
        assert_eq!(line_at(&nav), 20);
        assert!(!nav.move_to_divergence(false));
        nav.move_by(1);
        assert!(nav.move_to_divergence(true));
        assert_eq!(line_at(&nav), 20);
    }

    #[test]
    fn test_empty_trace() {
        let records = parse_records("1\n- 1\n", "trace").unwrap();
        let table = table();
        let mut nav = Navigator::new(&records, &table);
        assert!(nav.is_empty());
        assert!(!nav.move_by(1));
        assert!(!nav.step_over(false));
        assert!(!nav.move_to_divergence(false));
        assert!(nav.location().is_none());
        assert!(nav.call_stack().is_empty());
    }
}
