//! Comment stripping.
//!
//! Blanks `//` line comments and `/* ... */` block comments (delimiters
//! included) with [`PLACEHOLDER`], one placeholder per replaced character.
//! Everything else, including line structure, is left as it was. Block
//! comments may span any number of lines. Detection is purely lexical: string
//! literals containing comment markers are blanked too.

use crate::error::{CoreError, CoreResult};

/// Character written over comment text
pub const PLACEHOLDER: char = '-';

const LINE_COMMENT: &str = "//";
const BLOCK_OPEN: &str = "/*";
const BLOCK_CLOSE: &str = "*/";

/// Scanner position and comment state
#[derive(Debug, Clone, Copy, Default)]
struct Scan {
    line: usize,
    /// Byte offset into the current line
    offset: usize,
    in_block: bool,
    /// Byte offset of a block opener on the current line
    opener: Option<usize>,
}

impl Scan {
    fn next_line(&mut self) {
        self.line += 1;
        self.offset = 0;
        self.opener = None;
    }
}

/// Blank every comment in `lines`, starting `start_column` characters into
/// the first line.
///
/// # Errors
///
/// Returns `Internal` if a line and a block comment marker are found at the
/// same offset, which cannot happen for well-formed input.
pub fn strip_comments(lines: &mut [String], start_column: usize) -> CoreResult<()> {
    let mut scan = Scan {
        offset: lines.first().map_or(0, |first| byte_offset(first, start_column)),
        ..Scan::default()
    };

    while scan.line < lines.len() {
        let line = &lines[scan.line];
        let len = line.len();
        let cursor = scan.offset.min(len);
        let rest = &line[cursor..];

        if !scan.in_block {
            let single = rest.find(LINE_COMMENT);
            let multi = rest.find(BLOCK_OPEN);
            match (single, multi) {
                (Some(s), Some(m)) if s == m => {
                    debug_assert!(false, "comment markers at identical offset");
                    return Err(CoreError::Internal {
                        message: format!(
                            "line and block comment both start at line {} offset {}",
                            scan.line,
                            cursor + s
                        ),
                    });
                }
                (Some(s), m) if m.is_none_or(|m| s < m) => {
                    blank(&mut lines[scan.line], cursor + s, len);
                    scan.next_line();
                }
                (_, Some(m)) => {
                    let open = cursor + m;
                    let after = open + BLOCK_OPEN.len();
                    scan.in_block = true;
                    if after == len {
                        blank(&mut lines[scan.line], open, len);
                        scan.next_line();
                    } else {
                        scan.opener = Some(open);
                        scan.offset = after;
                    }
                }
                _ => scan.next_line(),
            }
        } else {
            let from = scan.opener.take().unwrap_or(cursor);
            match rest.find(BLOCK_CLOSE) {
                None => {
                    blank(&mut lines[scan.line], from, len);
                    scan.next_line();
                }
                Some(e) => {
                    let to = cursor + e + BLOCK_CLOSE.len();
                    scan.in_block = false;
                    let resume = blank(&mut lines[scan.line], from, to);
                    if to == len {
                        scan.next_line();
                    } else {
                        scan.offset = resume;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Replace `line[from..to]` with placeholders; returns the new byte offset of `to`
fn blank(line: &mut String, from: usize, to: usize) -> usize {
    let count = line[from..to].chars().count();
    let filler: String = std::iter::repeat_n(PLACEHOLDER, count).collect();
    line.replace_range(from..to, &filler);
    from + count
}

fn byte_offset(line: &str, column: usize) -> usize {
    line.char_indices()
        .nth(column)
        .map_or(line.len(), |(offset, _)| offset)
}
