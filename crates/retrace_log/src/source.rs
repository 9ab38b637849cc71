//! File-system source providers.

use indexmap::IndexMap;
use retrace_core::{CoreError, CoreResult, SourceProvider};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn read_source(path: &Path) -> CoreResult<Arc<[String]>> {
    let bytes = fs::read(path).map_err(|e| CoreError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    Ok(lines.into())
}

/// Reads the file again on every request
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl FsSource {
    /// Create a new provider (unit struct)
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SourceProvider for FsSource {
    fn lines(&self, path: &Path) -> CoreResult<Arc<[String]>> {
        read_source(path)
    }
}

/// Reads each file once and serves later requests from memory
#[derive(Debug, Default)]
pub struct SourceCache {
    files: RefCell<IndexMap<PathBuf, Arc<[String]>>>,
}

impl SourceCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    /// Whether nothing has been read yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }

    /// Drop every cached file
    pub fn clear(&self) {
        self.files.borrow_mut().clear();
    }
}

impl SourceProvider for SourceCache {
    fn lines(&self, path: &Path) -> CoreResult<Arc<[String]>> {
        if let Some(lines) = self.files.borrow().get(path) {
            return Ok(Arc::clone(lines));
        }
        let lines = read_source(path)?;
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), Arc::clone(&lines));
        Ok(lines)
    }
}
