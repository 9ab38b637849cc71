//! Method records and the 1-indexed method table.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a method's source lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourcePath {
    /// Resolved to a readable file
    Resolved(PathBuf),
    /// No source file could be found
    Unresolved,
}

impl SourcePath {
    /// Path, if resolved
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unresolved => None,
        }
    }

    /// Whether the path was resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl std::fmt::Display for SourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved(path) => write!(f, "{}", path.display()),
            Self::Unresolved => write!(f, "null"),
        }
    }
}

/// Identity used when comparing methods across two traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodIdentity<'a> {
    /// Method name
    pub name: &'a str,
    /// Declaring class
    pub class: &'a str,
    /// Descriptor tokens
    pub other_info: &'a [String],
}

/// Metadata for one declared method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    /// Method name
    pub name: String,
    /// Declaring class
    pub declaring_class: String,
    /// Source file
    pub source: SourcePath,
    /// First line, -1 when invalid
    pub start_line: i64,
    /// Last line, -1 when invalid
    pub end_line: i64,
    /// Ascending basic-block start lines, ending with the method's end line
    pub block_boundaries: Vec<i64>,
    /// Descriptor tokens (argument and return types)
    pub other_info: Vec<String>,
}

impl MethodRecord {
    /// Name of the implicit static initializer
    pub const STATIC_INITIALIZER: &'static str = "<clinit>";

    /// Create a record with no block information
    #[must_use]
    pub fn new(name: impl Into<String>, declaring_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: declaring_class.into(),
            source: SourcePath::Unresolved,
            start_line: -1,
            end_line: -1,
            block_boundaries: Vec::new(),
            other_info: Vec::new(),
        }
    }

    /// Set the source file
    #[must_use]
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = SourcePath::Resolved(path.into());
        self
    }

    /// Set the line range; boundaries default to the end line alone
    #[must_use]
    pub fn with_lines(mut self, start: i64, end: i64) -> Self {
        self.start_line = start;
        self.end_line = end;
        if self.block_boundaries.is_empty() {
            self.block_boundaries = vec![end];
        }
        self
    }

    /// Set the block boundaries (sorted on the way in)
    #[must_use]
    pub fn with_blocks(mut self, mut boundaries: Vec<i64>) -> Self {
        boundaries.sort_unstable();
        self.block_boundaries = boundaries;
        self
    }

    /// Set descriptor tokens
    #[must_use]
    pub fn with_other_info(mut self, info: Vec<String>) -> Self {
        self.other_info = info;
        self
    }

    /// Inert methods have no usable source and never contribute intervals
    #[must_use]
    pub fn is_inert(&self) -> bool {
        !self.source.is_resolved() || self.start_line == -1
    }

    /// Whether this is the implicit static initializer
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == Self::STATIC_INITIALIZER
    }

    /// Copy with the start line marked unresolved
    #[must_use]
    pub fn with_unresolved_start(&self) -> Self {
        Self {
            start_line: -1,
            ..self.clone()
        }
    }

    /// Comparison identity
    #[must_use]
    pub fn identity(&self) -> MethodIdentity<'_> {
        MethodIdentity {
            name: &self.name,
            class: &self.declaring_class,
            other_info: &self.other_info,
        }
    }

    /// First line of the first basic block
    #[must_use]
    pub fn first_block(&self) -> i64 {
        if self.start_line == -1 {
            return -1;
        }
        self.block_boundaries.first().copied().unwrap_or(self.start_line)
    }

    /// Last line of the basic block beginning at `begin`.
    ///
    /// The final boundary is the method's end line, so a block whose
    /// successor is that final boundary runs through the end line inclusive.
    #[must_use]
    pub fn end_of_block(&self, begin: i64) -> i64 {
        if begin == -1 {
            return -1;
        }
        let boundaries = &self.block_boundaries;
        let Some(&last) = boundaries.last() else {
            return self.end_line;
        };
        let next = match boundaries.iter().position(|&line| line == begin) {
            Some(index) => index + 1,
            None => boundaries.partition_point(|&line| line <= begin),
        };
        if next + 1 >= boundaries.len() {
            last
        } else if boundaries[next] > begin {
            boundaries[next] - 1
        } else {
            begin
        }
    }
}

impl std::fmt::Display for MethodRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} ({}:{}-{})",
            self.declaring_class, self.name, self.source, self.start_line, self.end_line
        )
    }
}

/// Ordered, 1-indexed table of method records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTable {
    records: Vec<Arc<MethodRecord>>,
}

impl MethodTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record; returns its 1-based id
    pub fn push(&mut self, record: MethodRecord) -> usize {
        self.records.push(Arc::new(record));
        self.records.len()
    }

    /// Look up a method by its 1-based id
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Arc<MethodRecord>> {
        id.checked_sub(1).and_then(|index| self.records.get(index))
    }

    /// Look up a method, failing when the id is unknown
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for ids outside the table
    pub fn lookup(&self, id: usize) -> CoreResult<&Arc<MethodRecord>> {
        self.get(id).ok_or_else(|| CoreError::NotFound {
            kind: "Method".to_string(),
            id: id.to_string(),
        })
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate `(id, record)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<MethodRecord>)> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (index + 1, record))
    }
}

impl FromIterator<MethodRecord> for MethodTable {
    fn from_iter<I: IntoIterator<Item = MethodRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(Arc::new).collect(),
        }
    }
}
