//! Return-value extrapolation.
//!
//! Attaches each return's payload to the call that opened the frame and each
//! call's arguments to its return, so either end of a frame can be read on
//! its own.

use retrace_log::Record;

/// Extrapolation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtrapolateError {
    /// A return appeared with no open call
    #[error("return at record {index} has no pending call")]
    UnbalancedReturn {
        /// 0-based record index
        index: usize,
    },
}

/// Index of the matching return for every call, by nesting depth
fn pair_frames(records: &[Record]) -> Result<Vec<Option<usize>>, ExtrapolateError> {
    let mut matching = vec![None; records.len()];
    let mut open = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match record {
            Record::Call { .. } => open.push(index),
            Record::Return { .. } => {
                let call = open.pop().ok_or(ExtrapolateError::UnbalancedReturn { index })?;
                matching[call] = Some(index);
            }
            _ => {}
        }
    }
    Ok(matching)
}

/// Rewrite a pretrace into a final trace
///
/// # Errors
///
/// Returns `UnbalancedReturn` if a return closes no call
pub fn extrapolate(records: &[Record]) -> Result<Vec<Record>, ExtrapolateError> {
    let matching = pair_frames(records)?;
    let mut pending: Vec<&[String]> = Vec::new();
    let mut out = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        match record {
            Record::Call {
                method_id,
                args,
                result,
            } => {
                let payload = matching[index].and_then(|ret| match &records[ret] {
                    Record::Return { values, .. } if !values.is_empty() => Some(values.clone()),
                    _ => None,
                });
                pending.push(args);
                out.push(Record::Call {
                    method_id: *method_id,
                    args: args.clone(),
                    result: payload.or_else(|| result.clone()),
                });
            }
            Record::Return {
                method_id, values, ..
            } => {
                let args = pending
                    .pop()
                    .ok_or(ExtrapolateError::UnbalancedReturn { index })?;
                out.push(Record::Return {
                    method_id: *method_id,
                    values: args.to_vec(),
                    result: (!values.is_empty()).then(|| values.clone()),
                });
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_log::{parse_records, read_records, write_records, Event};

    fn run(text: &str) -> Vec<String> {
        let records = parse_records(text, "test").unwrap();
        extrapolate(&records)
            .unwrap()
            .iter()
            .map(Record::to_string)
            .collect()
    }

    #[test]
    fn test_call_gets_return_payload() {
        assert_eq!(
            run("1 5 a\n[10,12]\n- 1 7\n"),
            vec!["1 5 a | 7", "[10,12]", "- 1 5 a | 7"]
        );
    }

    #[test]
    fn test_no_payload_no_suffix() {
        assert_eq!(run("2 x\n- 2\n"), vec!["2 x", "- 2 x"]);
    }

    #[test]
    fn test_nested_frames() {
        assert_eq!(
            run("1 a\n2 b\n- 2 B\n3\n- 3\n- 1 A\n"),
            vec!["1 a | A", "2 b | B", "- 2 b | B", "3", "- 3", "- 1 a | A"]
        );
    }

    #[test]
    fn test_exception_return() {
        let records = parse_records("1 a\n[3,3]\n- 1 Exception\n", "test").unwrap();
        let out = extrapolate(&records).unwrap();
        assert_eq!(out[0].to_string(), "1 a | Exception");
        assert_eq!(out[2].to_string(), "- 1 a | Exception");
        assert!(out[2].is_exception());
    }

    #[test]
    fn test_unmatched_call_unchanged() {
        assert_eq!(run("1 a\n[3,4]\n"), vec!["1 a", "[3,4]"]);
    }

    #[test]
    fn test_annotations_pass_through() {
        assert_eq!(
            run("* Difference in method call\n1\n^ Arguments were previously: 4\n- 1 2\n"),
            vec![
                "* Difference in method call",
                "1 | 2",
                "^ Arguments were previously: 4",
                "- 1 | 2"
            ]
        );
    }

    #[test]
    fn test_separator_values_survive_files() {
        let dir = tempfile::tempdir().unwrap();
        let pretrace_path = dir.path().join("pretrace.txt");
        let trace_path = dir.path().join("trace.txt");

        let call = match Event::parse("12 3 |").unwrap() {
            Event::Call {
                method_id, args, ..
            } => Record::call(method_id, args),
            other => panic!("unexpected event: {other}"),
        };
        let ret = match Event::parse("- 3 |").unwrap() {
            Event::Return { method_id, payload } => Record::ret(method_id, payload),
            other => panic!("unexpected event: {other}"),
        };
        let pretrace = vec![call, ret];
        write_records(&pretrace_path, &pretrace).unwrap();
        let reread = read_records(&pretrace_path).unwrap();
        assert_eq!(reread, pretrace);

        write_records(&trace_path, &extrapolate(&reread).unwrap()).unwrap();
        let separator = vec!["|".to_string()];
        assert_eq!(
            read_records(&trace_path).unwrap(),
            vec![
                Record::Call {
                    method_id: 3,
                    args: separator.clone(),
                    result: Some(separator.clone()),
                },
                Record::Return {
                    method_id: 3,
                    values: separator.clone(),
                    result: Some(separator),
                },
            ]
        );
    }

    #[test]
    fn test_unbalanced_return() {
        let records = parse_records("1\n- 1\n- 1\n", "test").unwrap();
        assert_eq!(
            extrapolate(&records),
            Err(ExtrapolateError::UnbalancedReturn { index: 2 })
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_nested_returns_carry_call_args(
            frames in proptest::collection::vec(
                (1usize..50, proptest::collection::vec("[a-z0-9]{1,4}", 0..3)),
                1..12,
            )
        ) {
            let mut records: Vec<Record> = frames
                .iter()
                .map(|(id, args)| Record::call(*id, args.clone()))
                .collect();
            records.extend(frames.iter().rev().map(|(id, _)| Record::ret(*id, Vec::new())));

            let out = extrapolate(&records).unwrap();
            proptest::prop_assert_eq!(out.len(), records.len());
            for (offset, (id, args)) in frames.iter().rev().enumerate() {
                let expected = Record::Return {
                    method_id: *id,
                    values: args.clone(),
                    result: None,
                };
                proptest::prop_assert_eq!(&out[frames.len() + offset], &expected);
            }
        }
    }
}
