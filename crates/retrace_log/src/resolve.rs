//! Method-table construction.
//!
//! The tracer writes one line per instrumented method:
//!
//! ```text
//! <id> <start|null> <end> <declared path> <class> <name> <descriptor...>
//! ```
//!
//! Resolution finds each declared path under the source roots, copies the
//! file into the trace's data directory, merges the per-file basic-block
//! marker file into the method's block boundaries, and produces the completed
//! method-id lines with the path rewritten relative to the data directory.

use retrace_core::{CoreError, MethodRecord, MethodTable};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Token used for missing start lines and unresolved paths
pub const NULL_TOKEN: &str = "null";

/// Directory under the data root receiving copied sources
pub const SOURCE_DIR: &str = "src";

/// Suffix of basic-block marker files
pub const BLOCK_MARKER_SUFFIX: &str = "BB";

/// Resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// File-system failure while copying or enumerating sources
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A method-id line did not parse
    #[error("method table line {line}: {source}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Underlying parse error
        #[source]
        source: CoreError,
    },
}

impl ResolveError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// A method as declared by the tracer, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// 1-based id
    pub id: usize,
    /// Declared start line (`None` for `null`)
    pub start: Option<i64>,
    /// Declared end line
    pub end: i64,
    /// Declared source path
    pub path: String,
    /// Declaring class
    pub class: String,
    /// Method name
    pub name: String,
    /// Descriptor tokens
    pub other_info: Vec<String>,
}

impl MethodDecl {
    /// Parse one method-id line
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if fewer than six fields are present or the
    /// numeric fields are malformed
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(CoreError::parse(format!(
                "expected at least 6 fields, found {}: {}",
                tokens.len(),
                line
            )));
        }
        let start = match tokens[1] {
            NULL_TOKEN => None,
            token => Some(token.parse()?),
        };
        Ok(Self {
            id: tokens[0].parse()?,
            start,
            end: tokens[2].parse()?,
            path: tokens[3].to_string(),
            class: tokens[4].to_string(),
            name: tokens[5].to_string(),
            other_info: tokens[6..].iter().map(|t| t.to_string()).collect(),
        })
    }

    /// Start line if it describes a valid range
    #[must_use]
    pub fn valid_start(&self) -> Option<i64> {
        self.start.filter(|&start| start <= self.end)
    }

    /// Completed-table line with the given (relative) path
    #[must_use]
    pub fn completed_line(&self, start: i64, path: &str) -> String {
        let mut fields = vec![
            self.id.to_string(),
            start.to_string(),
            self.end.to_string(),
            path.to_string(),
            self.class.clone(),
            self.name.clone(),
        ];
        fields.extend(self.other_info.iter().cloned());
        fields.join(" ")
    }
}

/// Name of the marker file for a declared source path: extension dropped,
/// separators turned into dashes, `BB` appended
#[must_use]
pub fn block_marker_name(declared: &str) -> String {
    let stem = Path::new(declared).with_extension("");
    format!(
        "{}{}",
        stem.to_string_lossy().replace('/', "-"),
        BLOCK_MARKER_SUFFIX
    )
}

/// Parse a marker file: one block-start line number per line
///
/// # Errors
///
/// Returns `ParseError` for non-numeric lines
pub fn parse_block_markers(text: &str) -> Result<Vec<i64>, CoreError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.parse::<i64>().map_err(CoreError::from))
        .collect()
}

/// Block boundaries for `[start, end]`: the range ends plus every marker
/// inside the range, with one copy of the start line removed, ascending
#[must_use]
pub fn merge_block_markers(start: i64, end: i64, markers: &[i64]) -> Vec<i64> {
    let mut boundaries = vec![start, end];
    boundaries.extend(
        markers
            .iter()
            .copied()
            .filter(|&line| start <= line && line <= end),
    );
    if let Some(index) = boundaries.iter().position(|&line| line == start) {
        boundaries.remove(index);
    }
    boundaries.sort_unstable();
    boundaries
}

/// Output of resolving a whole method-id file
#[derive(Debug, Clone, Default)]
pub struct ResolvedTable {
    /// Method table for the engines
    pub table: MethodTable,
    /// Lines of the completed method-id file
    pub completed: Vec<String>,
    /// Number of methods left unresolved
    pub unresolved: usize,
}

/// Resolves declared source paths against a set of source roots
#[derive(Debug, Clone)]
pub struct SourceResolver {
    data_root: PathBuf,
    /// Every file under every root, paired with the root it was found under
    files: Vec<(PathBuf, PathBuf)>,
}

impl SourceResolver {
    /// Enumerate a colon-separated list of source roots
    #[must_use]
    pub fn new(src_roots: &str, data_root: impl Into<PathBuf>) -> Self {
        Self::from_roots(
            src_roots
                .split(':')
                .filter(|root| !root.is_empty())
                .map(PathBuf::from),
            data_root,
        )
    }

    /// Enumerate explicit source roots. Symlinked directories are not
    /// followed; unreadable entries are skipped with a warning.
    #[must_use]
    pub fn from_roots(
        roots: impl IntoIterator<Item = PathBuf>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        let mut files = Vec::new();
        for root in roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "source root is not a directory");
                continue;
            }
            let found = source_files(&root);
            debug!(root = %root.display(), files = found.len(), "enumerated source root");
            files.extend(found.into_iter().map(|file| (file, root.clone())));
        }
        Self {
            data_root: data_root.into(),
            files,
        }
    }

    /// Number of enumerated files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// First enumerated file whose path contains `declared`
    #[must_use]
    pub fn find(&self, declared: &str) -> Option<(&Path, &Path)> {
        self.files
            .iter()
            .find(|(file, _)| file.to_string_lossy().contains(declared))
            .map(|(file, root)| (file.as_path(), root.as_path()))
    }

    /// Resolve one declaration. Unresolvable sources and missing marker files
    /// produce an inert record rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a found source cannot be copied into the data root
    pub fn resolve(&self, decl: &MethodDecl) -> Result<(MethodRecord, String), ResolveError> {
        let record = MethodRecord::new(decl.name.clone(), decl.class.clone())
            .with_other_info(decl.other_info.clone());

        let Some((file, root)) = self.find(&decl.path) else {
            warn!(method = %decl.name, path = %decl.path, "unable to find source file");
            let record = record.with_lines(-1, decl.end);
            return Ok((record, decl.completed_line(-1, NULL_TOKEN)));
        };

        let relative = Path::new(SOURCE_DIR).join(file.strip_prefix(root).unwrap_or(file));
        let stored = self.data_root.join(&relative);
        if !stored.exists() {
            if let Some(parent) = stored.parent() {
                fs::create_dir_all(parent).map_err(|e| ResolveError::io(parent, e))?;
            }
            fs::copy(file, &stored).map_err(|e| ResolveError::io(file, e))?;
        }
        let relative = relative.to_string_lossy().into_owned();

        let start = decl.valid_start().unwrap_or(-1);
        let completed = decl.completed_line(start, &relative);
        let record = record.with_source(stored);
        if start == -1 {
            return Ok((record.with_lines(-1, decl.end), completed));
        }

        let marker_path = self.data_root.join(block_marker_name(&decl.path));
        let markers = fs::read_to_string(&marker_path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_block_markers(&text).map_err(|e| e.to_string()));
        match markers {
            Ok(markers) => {
                let boundaries = merge_block_markers(start, decl.end, &markers);
                Ok((
                    record.with_lines(start, decl.end).with_blocks(boundaries),
                    completed,
                ))
            }
            Err(reason) => {
                warn!(
                    method = %decl.name,
                    marker = %marker_path.display(),
                    %reason,
                    "unable to read basic block file"
                );
                Ok((record.with_lines(-1, decl.end), completed))
            }
        }
    }

    /// Resolve every non-blank line of a raw method-id file, in order
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed lines or `Io` for copy failures
    pub fn resolve_all(&self, lines: &[String]) -> Result<ResolvedTable, ResolveError> {
        let mut resolved = ResolvedTable::default();
        for (index, line) in lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
        {
            let decl = MethodDecl::parse(line).map_err(|source| ResolveError::Parse {
                line: index + 1,
                source,
            })?;
            let (record, completed) = self.resolve(&decl)?;
            if record.is_inert() {
                resolved.unresolved += 1;
            }
            resolved.table.push(record);
            resolved.completed.push(completed);
        }
        Ok(resolved)
    }
}

/// Files below `root` in file-name order, symlinked files included
fn source_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_file()
                    || (entry.path_is_symlink() && entry.path().is_file());
                if is_file {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(%path, error = %err, "skipping unreadable source entry");
            }
        }
    }
    files
}

/// Read a completed method-id file back, with paths relative to `dir`
///
/// # Errors
///
/// Returns `Io` if the file cannot be read or `Parse` for malformed lines
pub fn load_completed(path: &Path, dir: &Path) -> Result<MethodTable, ResolveError> {
    let text = fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
    let mut table = MethodTable::new();
    for (index, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let decl = MethodDecl::parse(line).map_err(|source| ResolveError::Parse {
            line: index + 1,
            source,
        })?;
        let mut record = MethodRecord::new(decl.name.clone(), decl.class.clone())
            .with_other_info(decl.other_info.clone());
        if decl.path != NULL_TOKEN {
            record = record.with_source(dir.join(&decl.path));
        }
        table.push(record.with_lines(decl.valid_start().unwrap_or(-1), decl.end));
    }
    Ok(table)
}
