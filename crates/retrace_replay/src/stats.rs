//! Comparison statistics and their history file.

use retrace_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Default history file name
pub const DEFAULT_STATS_FILE: &str = "data.txt";

/// Outcome of one alignment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignStats {
    /// Divergence annotations written; one that reconverges at once still counts
    pub divergences: usize,
    /// Sum of absolute offset changes
    pub total_drift: u64,
}

impl AlignStats {
    /// Append as two lines to the history file, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened or written
    pub fn append_to(&self, path: &Path) -> CoreResult<()> {
        let io_err = |e: std::io::Error| CoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        write!(file, "{}\n{}\n", self.divergences, self.total_drift).map_err(io_err)
    }

    /// Parse a history: pairs of lines, divergences then drift
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for non-numeric lines or a dangling first half
    pub fn parse_history(text: &str) -> CoreResult<Vec<Self>> {
        let values: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if values.len() % 2 != 0 {
            return Err(CoreError::parse(format!(
                "statistics history has an odd number of lines ({})",
                values.len()
            )));
        }
        values
            .chunks(2)
            .map(|pair| {
                Ok(Self {
                    divergences: pair[0].parse()?,
                    total_drift: pair[1].parse()?,
                })
            })
            .collect()
    }

    /// Read the whole history file
    ///
    /// # Errors
    ///
    /// Returns `Io` or `ParseError`
    pub fn read_all(path: &Path) -> CoreResult<Vec<Self>> {
        let text = fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse_history(&text)
    }
}
