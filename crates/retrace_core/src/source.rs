//! Access to source file contents.

use crate::error::{CoreError, CoreResult};
use crate::extract;
use crate::interval::Interval;
use crate::method::MethodRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supplies whole-file line contents to the engines
pub trait SourceProvider {
    /// All lines of the file at `path`, without line terminators
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read
    fn lines(&self, path: &Path) -> CoreResult<Arc<[String]>>;

    /// Code intervals of `range` in the file at `path`
    ///
    /// # Errors
    ///
    /// Returns the read error or an extraction error
    fn code_intervals(&self, path: &Path, range: Interval) -> CoreResult<Vec<Interval>> {
        let lines = self.lines(path)?;
        extract::code_intervals(&lines, range)
    }

    /// Source text of `range` in `method`'s file. Lines past the end of the
    /// file are dropped rather than reported.
    ///
    /// # Errors
    ///
    /// Returns `Unresolved` for methods without a source file, or the read error
    fn block_text(&self, method: &MethodRecord, range: Interval) -> CoreResult<Vec<String>> {
        let path = method.source.as_path().ok_or_else(|| CoreError::Unresolved {
            method: method.to_string(),
        })?;
        let lines = self.lines(path)?;
        if range.is_empty() || range.start < 1 {
            return Ok(Vec::new());
        }
        let start = (range.start - 1) as usize;
        let end = (range.end as usize).min(lines.len());
        Ok(lines.get(start..end).map(<[String]>::to_vec).unwrap_or_default())
    }
}

impl<T: SourceProvider + ?Sized> SourceProvider for &T {
    fn lines(&self, path: &Path) -> CoreResult<Arc<[String]>> {
        (**self).lines(path)
    }
}

/// In-memory sources keyed by path, for tests and pre-loaded inputs
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Arc<[String]>>,
}

impl MemorySource {
    /// Create an empty set of files
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file from its text
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, text: &str) -> Self {
        self.insert(path, text);
        self
    }

    /// Add or replace a file from its text
    pub fn insert(&mut self, path: impl Into<PathBuf>, text: &str) {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        self.files.insert(path.into(), lines.into());
    }
}

impl SourceProvider for MemorySource {
    fn lines(&self, path: &Path) -> CoreResult<Arc<[String]>> {
        self.files.get(path).cloned().ok_or_else(|| CoreError::Io {
            path: path.display().to_string(),
            reason: "not loaded".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_intervals() {
        let source = MemorySource::new().with_file("A.java", "a();\n\nb();\n");
        let intervals = source
            .code_intervals(Path::new("A.java"), Interval::new(1, 3))
            .unwrap();
        assert_eq!(intervals, vec![Interval::point(1), Interval::point(3)]);
    }

    #[test]
    fn test_memory_source_missing() {
        let source = MemorySource::new();
        assert!(matches!(
            source.lines(Path::new("nope")),
            Err(CoreError::Io { .. })
        ));
    }

    #[test]
    fn test_block_text_clamps_to_file() {
        let source = MemorySource::new().with_file("A.java", "a();\nb();\n");
        let method = MethodRecord::new("f", "A")
            .with_source("A.java")
            .with_lines(1, 2);
        let text = source.block_text(&method, Interval::new(2, 5)).unwrap();
        assert_eq!(text, vec!["b();".to_string()]);
        assert!(source.block_text(&method, Interval::new(4, 5)).unwrap().is_empty());
    }

    #[test]
    fn test_block_text_unresolved() {
        let source = MemorySource::new();
        let method = MethodRecord::new("f", "A");
        assert!(matches!(
            source.block_text(&method, Interval::point(1)),
            Err(CoreError::Unresolved { .. })
        ));
    }
}
