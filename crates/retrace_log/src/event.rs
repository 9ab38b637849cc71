//! Raw tracer events.
//!
//! One event per line of the tracer's call log:
//!
//! ```text
//! <invocation line> <method id> <args...>    call (invocation line may be -1)
//! - <method id> <payload...>                 return
//! @<method id>:<block start line>            basic-block change
//! ```

use retrace_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Invocation line recorded when the tracer could not tell where a call came from
pub const UNKNOWN_LINE: i64 = -1;

/// A parsed raw trace line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Method entered
    Call {
        /// Line in the caller that made the call, or [`UNKNOWN_LINE`]
        invocation_line: i64,
        /// 1-based method id
        method_id: usize,
        /// Argument tokens
        args: Vec<String>,
    },
    /// Method returned
    Return {
        /// 1-based method id
        method_id: usize,
        /// Return value tokens
        payload: Vec<String>,
    },
    /// Execution moved to a new basic block
    BlockChange {
        /// 1-based method id
        method_id: usize,
        /// First line of the new block
        block_start: i64,
    },
}

impl Event {
    /// Method id the event refers to
    #[must_use]
    pub const fn method_id(&self) -> usize {
        match self {
            Self::Call { method_id, .. }
            | Self::Return { method_id, .. }
            | Self::BlockChange { method_id, .. } => *method_id,
        }
    }

    /// Parse one raw line
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for blank lines and unknown shapes
    pub fn parse(line: &str) -> CoreResult<Self> {
        let trimmed = line.trim_start();
        if let Some(block) = trimmed.strip_prefix('@') {
            let mut parts = block
                .split(|c: char| c == ':' || c == '@' || c.is_whitespace())
                .filter(|part| !part.is_empty());
            let method_id = parse_id(parts.next(), line)?;
            let block_start = parts
                .next()
                .ok_or_else(|| CoreError::parse(format!("block change without line: {}", line)))?
                .parse()?;
            return Ok(Self::BlockChange {
                method_id,
                block_start,
            });
        }

        let mut tokens = trimmed.split_whitespace();
        let first = tokens
            .next()
            .ok_or_else(|| CoreError::parse("empty trace line"))?;
        if let Ok(invocation_line) = first.parse::<i64>() {
            let method_id = parse_id(tokens.next(), line)?;
            return Ok(Self::Call {
                invocation_line,
                method_id,
                args: tokens.map(str::to_string).collect(),
            });
        }
        if first == "-" {
            let method_id = parse_id(tokens.next(), line)?;
            return Ok(Self::Return {
                method_id,
                payload: tokens.map(str::to_string).collect(),
            });
        }
        Err(CoreError::parse(format!("unexpected trace line: {}", line)))
    }
}

impl FromStr for Event {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call {
                invocation_line,
                method_id,
                args,
            } => {
                write!(f, "{} {}", invocation_line, method_id)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Self::Return { method_id, payload } => {
                write!(f, "- {}", method_id)?;
                for token in payload {
                    write!(f, " {}", token)?;
                }
                Ok(())
            }
            Self::BlockChange {
                method_id,
                block_start,
            } => write!(f, "@{}:{}", method_id, block_start),
        }
    }
}

fn parse_id(token: Option<&str>, line: &str) -> CoreResult<usize> {
    token
        .ok_or_else(|| CoreError::parse(format!("missing method id: {}", line)))?
        .parse::<usize>()
        .map_err(|_| CoreError::parse(format!("invalid method id: {}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call() {
        let event = Event::parse("12 3 a 7\n").unwrap();
        assert_eq!(
            event,
            Event::Call {
                invocation_line: 12,
                method_id: 3,
                args: vec!["a".into(), "7".into()],
            }
        );
    }

    #[test]
    fn test_parse_call_unknown_invocation() {
        let event = Event::parse("-1\t4").unwrap();
        assert!(matches!(
            event,
            Event::Call {
                invocation_line: UNKNOWN_LINE,
                method_id: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_return() {
        let event = Event::parse("- 3 42").unwrap();
        assert_eq!(
            event,
            Event::Return {
                method_id: 3,
                payload: vec!["42".into()],
            }
        );
        assert_eq!(event.method_id(), 3);
    }

    #[test]
    fn test_parse_block_change() {
        let event = Event::parse("@5:18\n").unwrap();
        assert_eq!(
            event,
            Event::BlockChange {
                method_id: 5,
                block_start: 18,
            }
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(Event::parse("").is_err());
        assert!(Event::parse("hello 1").is_err());
        assert!(Event::parse("- x").is_err());
        assert!(Event::parse("@5").is_err());
        assert!(Event::parse("12").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::parse("12 3 a").unwrap().to_string(), "12 3 a");
        assert_eq!(Event::parse("-  3").unwrap().to_string(), "- 3");
        assert_eq!(Event::parse("@5:18").unwrap().to_string(), "@5:18");
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_never_panics(line in "\\PC{0,40}") {
            let _ = Event::parse(&line);
        }

        #[test]
        fn prop_block_change_display(method_id in 1usize..10_000, line in 0i64..100_000) {
            let text = format!("@{method_id}:{line}");
            let event = Event::parse(&text).unwrap();
            proptest::prop_assert_eq!(event.to_string(), text);
        }
    }
}
