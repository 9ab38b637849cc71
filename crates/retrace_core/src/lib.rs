//! retrace core types
//!
//! Pure types and algorithms with no file-system access: method records,
//! source-line intervals, comment stripping and code-interval extraction.
//! File contents reach the engines through [`SourceProvider`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extract;
pub mod interval;
pub mod lexer;
pub mod method;
pub mod source;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use extract::{code_intervals, is_blank};
pub use interval::Interval;
pub use lexer::{strip_comments, PLACEHOLDER};
pub use method::{MethodIdentity, MethodRecord, MethodTable, SourcePath};
pub use source::{MemorySource, SourceProvider};
