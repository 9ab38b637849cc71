//! Pretrace and final-trace records.
//!
//! A completed trace is a sequence of lines in one of five shapes:
//!
//! ```text
//! <id> <args...> [| <result...>]        call
//! - <id> <values...> [| <result...>]    return
//! [<start>,<end>]                       executed source interval
//! * <text>                              divergence / reconvergence annotation
//! ^ <text>                              informational annotation
//! ```
//!
//! In a pretrace a return's `values` hold the returned payload. After
//! extrapolation they hold the call's arguments and `result` the payload.
//!
//! Traced values are arbitrary tokens, so a token that is exactly `|` or
//! starts with `\` is written with an extra leading `\`. Only a bare `|`
//! separates the result.

use retrace_core::{CoreError, CoreResult, Interval};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Payload token marking a return synthesized for an uncaught exception
pub const EXCEPTION: &str = "Exception";

const RESULT_SEPARATOR: &str = "|";

const ESCAPE: char = '\\';

/// One line of a pretrace or final trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Method call
    Call {
        /// 1-based method id
        method_id: usize,
        /// Argument tokens
        args: Vec<String>,
        /// Eventual return value, once extrapolated
        result: Option<Vec<String>>,
    },
    /// Method return
    Return {
        /// 1-based method id
        method_id: usize,
        /// Payload (pretrace) or original arguments (final trace)
        values: Vec<String>,
        /// Return value, once extrapolated
        result: Option<Vec<String>>,
    },
    /// Executed source lines
    Interval(Interval),
    /// `*` annotation
    Divergence(String),
    /// `^` annotation
    Note(String),
}

/// Coarse record kind, for order comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Method call
    Call,
    /// Method return
    Return,
    /// Executed source lines
    Interval,
    /// Annotation of either kind
    Annotation,
}

impl Record {
    /// Call record without a result
    #[must_use]
    pub fn call(method_id: usize, args: Vec<String>) -> Self {
        Self::Call {
            method_id,
            args,
            result: None,
        }
    }

    /// Return record without a result
    #[must_use]
    pub fn ret(method_id: usize, values: Vec<String>) -> Self {
        Self::Return {
            method_id,
            values,
            result: None,
        }
    }

    /// Return synthesized for a frame ended by an uncaught exception
    #[must_use]
    pub fn exception_return(method_id: usize) -> Self {
        Self::ret(method_id, vec![EXCEPTION.to_string()])
    }

    /// Kind of this record
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Call { .. } => RecordKind::Call,
            Self::Return { .. } => RecordKind::Return,
            Self::Interval(_) => RecordKind::Interval,
            Self::Divergence(_) | Self::Note(_) => RecordKind::Annotation,
        }
    }

    /// Method id for calls and returns
    #[must_use]
    pub const fn method_id(&self) -> Option<usize> {
        match self {
            Self::Call { method_id, .. } | Self::Return { method_id, .. } => Some(*method_id),
            _ => None,
        }
    }

    /// Interval, if this is an interval record
    #[must_use]
    pub const fn interval(&self) -> Option<Interval> {
        match self {
            Self::Interval(interval) => Some(*interval),
            _ => None,
        }
    }

    /// Whether this return closes a frame ended by an exception
    #[must_use]
    pub fn is_exception(&self) -> bool {
        match self {
            Self::Return { values, result, .. } => result
                .as_ref()
                .unwrap_or(values)
                .last()
                .is_some_and(|token| token == EXCEPTION),
            _ => false,
        }
    }

    /// Parse one line
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for lines matching none of the record shapes
    pub fn parse(line: &str) -> CoreResult<Self> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            return Ok(Self::Interval(trimmed.parse()?));
        }
        if let Some(text) = trimmed.strip_prefix('*') {
            return Ok(Self::Divergence(text.trim().to_string()));
        }
        if let Some(text) = trimmed.strip_prefix('^') {
            return Ok(Self::Note(text.trim().to_string()));
        }

        let mut tokens = trimmed.split_whitespace();
        let first = tokens
            .next()
            .ok_or_else(|| CoreError::parse("empty trace line"))?;
        if first == "-" {
            let method_id = parse_id(tokens.next(), line)?;
            let (values, result) = split_result(tokens);
            return Ok(Self::Return {
                method_id,
                values,
                result,
            });
        }
        if let Ok(method_id) = first.parse::<usize>() {
            let (args, result) = split_result(tokens);
            return Ok(Self::Call {
                method_id,
                args,
                result,
            });
        }
        Err(CoreError::parse(format!("unexpected trace record: {}", line)))
    }
}

fn split_result<'a>(tokens: impl Iterator<Item = &'a str>) -> (Vec<String>, Option<Vec<String>>) {
    let mut before = Vec::new();
    let mut after: Option<Vec<String>> = None;
    for token in tokens {
        match &mut after {
            Some(result) => result.push(unescape(token)),
            None if token == RESULT_SEPARATOR => after = Some(Vec::new()),
            None => before.push(unescape(token)),
        }
    }
    (before, after)
}

fn unescape(token: &str) -> String {
    token.strip_prefix(ESCAPE).unwrap_or(token).to_string()
}

fn parse_id(token: Option<&str>, line: &str) -> CoreResult<usize> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| CoreError::parse(format!("invalid method id in record: {}", line)))
}

fn write_tokens(f: &mut std::fmt::Formatter<'_>, tokens: &[String]) -> std::fmt::Result {
    for token in tokens {
        if token == RESULT_SEPARATOR || token.starts_with(ESCAPE) {
            write!(f, " {}{}", ESCAPE, token)?;
        } else {
            write!(f, " {}", token)?;
        }
    }
    Ok(())
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call {
                method_id,
                args,
                result,
            } => {
                write!(f, "{}", method_id)?;
                write_tokens(f, args)?;
                if let Some(result) = result {
                    write!(f, " {}", RESULT_SEPARATOR)?;
                    write_tokens(f, result)?;
                }
                Ok(())
            }
            Self::Return {
                method_id,
                values,
                result,
            } => {
                write!(f, "- {}", method_id)?;
                write_tokens(f, values)?;
                if let Some(result) = result {
                    write!(f, " {}", RESULT_SEPARATOR)?;
                    write_tokens(f, result)?;
                }
                Ok(())
            }
            Self::Interval(interval) => write!(f, "{}", interval),
            Self::Divergence(text) => write!(f, "* {}", text),
            Self::Note(text) => write!(f, "^ {}", text),
        }
    }
}

impl FromStr for Record {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl From<Interval> for Record {
    fn from(interval: Interval) -> Self {
        Self::Interval(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_result() {
        let record = Record::parse("3 a b | 7\n").unwrap();
        assert_eq!(
            record,
            Record::Call {
                method_id: 3,
                args: vec!["a".into(), "b".into()],
                result: Some(vec!["7".into()]),
            }
        );
        assert_eq!(record.to_string(), "3 a b | 7");
    }

    #[test]
    fn test_parse_return() {
        let record = Record::parse("- 5 | 7").unwrap();
        assert_eq!(
            record,
            Record::Return {
                method_id: 5,
                values: Vec::new(),
                result: Some(vec!["7".into()]),
            }
        );
        assert_eq!(record.kind(), RecordKind::Return);
        assert_eq!(record.method_id(), Some(5));
    }

    #[test]
    fn test_parse_interval_and_annotations() {
        assert_eq!(
            Record::parse("[10,12]").unwrap(),
            Record::Interval(Interval::new(10, 12))
        );
        assert_eq!(
            Record::parse("* Difference in method call").unwrap(),
            Record::Divergence("Difference in method call".into())
        );
        assert_eq!(
            Record::parse("^ Arguments were previously: 4").unwrap().to_string(),
            "^ Arguments were previously: 4"
        );
    }

    #[test]
    fn test_exception_return() {
        let record = Record::exception_return(9);
        assert_eq!(record.to_string(), "- 9 Exception");
        assert!(record.is_exception());
        assert!(Record::parse("- 9 a | Exception").unwrap().is_exception());
        assert!(!Record::parse("- 9 Exception | 4").unwrap().is_exception());
        assert!(!Record::parse("- 9 4").unwrap().is_exception());
    }

    #[test]
    fn test_separator_tokens_survive_printing() {
        let call = Record::Call {
            method_id: 3,
            args: vec!["|".into(), "\\n".into()],
            result: Some(vec!["|".into()]),
        };
        assert_eq!(call.to_string(), r"3 \| \\n | \|");
        assert_eq!(Record::parse(&call.to_string()).unwrap(), call);

        let ret = Record::ret(3, vec!["|".into()]);
        assert_eq!(ret.to_string(), "- 3 \\|");
        assert_eq!(Record::parse(&ret.to_string()).unwrap(), ret);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Record::parse("").is_err());
        assert!(Record::parse("@3:4").is_err());
        assert!(Record::parse("- x").is_err());
        assert!(Record::parse("[3]").is_err());
    }
}
