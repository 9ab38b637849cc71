//! Whole-file readers and append-only record writers.

use crate::record::Record;
use retrace_core::CoreError;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Stream errors
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A line did not parse
    #[error("{path}:{line}: {source}")]
    Parse {
        /// File involved
        path: String,
        /// 1-based line number
        line: usize,
        /// Underlying parse error
        #[source]
        source: CoreError,
    },
}

impl StreamError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Read a whole file into lines. Blank lines are kept so that positions
/// match the file's line numbers.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read
pub fn read_lines(path: &Path) -> Result<Vec<String>, StreamError> {
    let text = fs::read_to_string(path).map_err(|e| StreamError::io(path, e))?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Parse every non-empty line of `text` as a record
///
/// # Errors
///
/// Returns `Parse` naming the first bad line
pub fn parse_records(text: &str, origin: &str) -> Result<Vec<Record>, StreamError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            Record::parse(line).map_err(|source| StreamError::Parse {
                path: origin.to_string(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Read a pretrace or final trace
///
/// # Errors
///
/// Returns `Io` or `Parse`
pub fn read_records(path: &Path) -> Result<Vec<Record>, StreamError> {
    let text = fs::read_to_string(path).map_err(|e| StreamError::io(path, e))?;
    parse_records(&text, &path.display().to_string())
}

/// Append-only writer of records, one per line
pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Append one record
    ///
    /// # Errors
    ///
    /// Returns the underlying write error
    pub fn write(&mut self, record: &Record) -> io::Result<()> {
        writeln!(self.inner, "{}", record)?;
        self.written += 1;
        Ok(())
    }

    /// Append several records
    ///
    /// # Errors
    ///
    /// Returns the underlying write error
    pub fn write_all<'a>(&mut self, records: impl IntoIterator<Item = &'a Record>) -> io::Result<()> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Records written so far
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the inner writer
    ///
    /// # Errors
    ///
    /// Returns the flush error
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl RecordWriter<BufWriter<fs::File>> {
    /// Create (truncating) a record file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be created
    pub fn create(path: &Path) -> Result<Self, StreamError> {
        let file = fs::File::create(path).map_err(|e| StreamError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

/// Write records to a file, replacing its contents
///
/// # Errors
///
/// Returns `Io` on failure
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), StreamError> {
    let mut writer = RecordWriter::create(path)?;
    writer
        .write_all(records)
        .map_err(|e| StreamError::io(path, e))?;
    writer.finish().map_err(|e| StreamError::io(path, e))?;
    Ok(())
}
