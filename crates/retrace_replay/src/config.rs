//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Trace completion configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Log the call stack after every event
    pub trace_stack: bool,
}

impl CompletionConfig {
    /// Log the call stack after every event
    #[must_use]
    pub fn with_trace_stack(mut self, enabled: bool) -> Self {
        self.trace_stack = enabled;
        self
    }
}

/// Trace alignment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Annotate argument and return value differences
    pub verbose: bool,
    /// Report divergence details at `info` instead of `debug`
    pub print_divergence: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            print_divergence: true,
        }
    }
}

impl AlignConfig {
    /// Annotate argument and return value differences
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Report divergence details at `info` instead of `debug`
    #[must_use]
    pub fn with_print_divergence(mut self, enabled: bool) -> Self {
        self.print_divergence = enabled;
        self
    }
}
