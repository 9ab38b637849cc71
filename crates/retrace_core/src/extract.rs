//! Code-interval extraction.
//!
//! A line counts as code when, after comment stripping, it contains at least
//! one character outside [`IGNORED_CHARS`].

use crate::error::{CoreError, CoreResult};
use crate::interval::Interval;
use crate::lexer::strip_comments;

/// Characters that never make a line count as code
pub const IGNORED_CHARS: [char; 7] = ['-', '/', ' ', '\n', '\t', '*', '\r'];

/// Whether a (stripped) line holds nothing but ignored characters
#[must_use]
pub fn is_blank(line: &str) -> bool {
    line.chars().all(|c| IGNORED_CHARS.contains(&c))
}

/// Lines `range.start..=range.end` (1-based) of `file`.
///
/// # Errors
///
/// Returns `LineOutOfRange` if the range starts before line 1 or ends past the
/// last line. Reversed ranges yield an empty slice.
pub fn line_slice(file: &[String], range: Interval) -> CoreResult<&[String]> {
    if range.is_empty() {
        return Ok(&[]);
    }
    if range.start < 1 || range.end as usize > file.len() {
        return Err(CoreError::LineOutOfRange {
            start: range.start,
            end: range.end,
            available: file.len(),
        });
    }
    Ok(&file[(range.start - 1) as usize..range.end as usize])
}

/// Maximal ascending intervals of code lines within `range` of `file`
///
/// # Errors
///
/// Returns `LineOutOfRange` for ranges outside the file, or `Internal` if the
/// lexer reaches an impossible state.
pub fn code_intervals(file: &[String], range: Interval) -> CoreResult<Vec<Interval>> {
    let mut lines = line_slice(file, range)?.to_vec();
    strip_comments(&mut lines, 0)?;

    let mut intervals = Vec::new();
    let mut open: Option<i64> = None;
    for (line_no, line) in (range.start..).zip(&lines) {
        match (is_blank(line), open) {
            (true, Some(begin)) => {
                intervals.push(Interval::new(begin, line_no - 1));
                open = None;
            }
            (false, None) => open = Some(line_no),
            _ => {}
        }
    }
    if let Some(begin) = open {
        intervals.push(Interval::new(begin, range.end));
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank("  \t-- * /\r"));
        assert!(!is_blank("  }"));
    }

    #[test]
    fn test_code_intervals_basic() {
        let src = file(&[
            "void f() {",
            "  int x = 1;",
            "",
            "  // note",
            "  x++;",
            "}",
        ]);
        let intervals = code_intervals(&src, Interval::new(1, 6)).unwrap();
        assert_eq!(intervals, vec![Interval::new(1, 2), Interval::new(5, 6)]);
    }

    #[test]
    fn test_code_intervals_block_comment() {
        let src = file(&["a();", "/*", " * doc", " */", "b();"]);
        let intervals = code_intervals(&src, Interval::new(1, 5)).unwrap();
        assert_eq!(intervals, vec![Interval::point(1), Interval::point(5)]);
    }

    #[test]
    fn test_code_intervals_subrange() {
        let src = file(&["a();", "b();", "c();", "d();"]);
        let intervals = code_intervals(&src, Interval::new(2, 3)).unwrap();
        assert_eq!(intervals, vec![Interval::new(2, 3)]);
    }

    #[test]
    fn test_code_intervals_all_blank() {
        let src = file(&["", "// x", "   "]);
        assert!(code_intervals(&src, Interval::new(1, 3)).unwrap().is_empty());
    }

    #[test]
    fn test_code_intervals_reversed_range() {
        let src = file(&["a();"]);
        assert!(code_intervals(&src, Interval::new(3, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_code_intervals_out_of_range() {
        let src = file(&["a();"]);
        let err = code_intervals(&src, Interval::new(1, 4)).unwrap_err();
        assert!(matches!(err, CoreError::LineOutOfRange { available: 1, .. }));
        assert!(code_intervals(&src, Interval::new(0, 1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_intervals_partition_range(
            lines in proptest::collection::vec("[a /*;]{0,10}", 1..16),
            a in 0usize..16,
            b in 0usize..16,
        ) {
            let n = lines.len();
            let (a, b) = (a % n, b % n);
            let (lo, hi) = (a.min(b) as i64 + 1, a.max(b) as i64 + 1);
            let range = Interval::new(lo, hi);
            let intervals = code_intervals(&lines, range).unwrap();

            let mut stripped = line_slice(&lines, range).unwrap().to_vec();
            strip_comments(&mut stripped, 0).unwrap();

            let mut previous_end = lo - 1;
            for interval in &intervals {
                prop_assert!(interval.start > previous_end);
                prop_assert!(interval.start <= interval.end);
                previous_end = interval.end;
            }
            for (line_no, line) in (lo..=hi).zip(&stripped) {
                let covered = intervals.iter().any(|iv| iv.contains(line_no));
                prop_assert_eq!(covered, !is_blank(line));
            }
        }
    }
}
