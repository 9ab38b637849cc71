//! retrace replay engines
//!
//! Trace completion, return-value extrapolation, trace alignment with
//! divergence statistics, and a cursor for navigating final traces.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod align;
pub mod completion;
pub mod config;
pub mod extrapolate;
pub mod navigate;
pub mod stats;

pub use align::{AlignError, AlignOutcome, ShadowFrame, Side, TraceAligner};
pub use completion::{BlockCursor, CompletionEngine, CompletionError, CompletionSummary, Frame};
pub use config::{AlignConfig, CompletionConfig};
pub use extrapolate::{extrapolate, ExtrapolateError};
pub use navigate::{Location, Navigator, Step};
pub use stats::{AlignStats, DEFAULT_STATS_FILE};
