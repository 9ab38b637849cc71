//! Inclusive source-line intervals.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Inclusive `[start, end]` run of source lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    /// First line (1-based)
    pub start: i64,
    /// Last line (inclusive)
    pub end: i64,
}

impl Interval {
    /// Create a new interval
    #[must_use]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Single-line interval
    #[must_use]
    pub const fn point(line: i64) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    /// Number of lines covered (zero for reversed bounds)
    #[must_use]
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    /// Whether the interval covers no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Whether `line` lies inside the interval
    #[must_use]
    pub fn contains(&self, line: i64) -> bool {
        self.start <= line && line <= self.end
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| CoreError::parse(format!("interval must be bracketed: {}", s)))?;
        let (start, end) = inner
            .split_once(',')
            .ok_or_else(|| CoreError::parse(format!("interval missing comma: {}", s)))?;
        Ok(Self {
            start: start.trim().parse()?,
            end: end.trim().parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_display() {
        assert_eq!(Interval::new(10, 12).to_string(), "[10,12]");
        assert_eq!(Interval::point(-1).to_string(), "[-1,-1]");
    }

    #[test]
    fn test_interval_parse() {
        let interval: Interval = "[3,7]".parse().unwrap();
        assert_eq!(interval, Interval::new(3, 7));
        let interval: Interval = " [ 4 , 4 ] ".parse().unwrap();
        assert_eq!(interval, Interval::point(4));
    }

    #[test]
    fn test_interval_parse_invalid() {
        assert!("3,7".parse::<Interval>().is_err());
        assert!("[3;7]".parse::<Interval>().is_err());
        assert!("[a,7]".parse::<Interval>().is_err());
    }

    #[test]
    fn test_interval_len() {
        assert_eq!(Interval::new(3, 7).len(), 5);
        assert_eq!(Interval::point(9).len(), 1);
        assert!(Interval::new(8, 7).is_empty());
        assert!(Interval::new(3, 7).contains(7));
        assert!(!Interval::new(3, 7).contains(8));
    }
}
