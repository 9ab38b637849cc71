//! retrace trace formats
//!
//! Raw tracer events, pretrace and final-trace records, method-table
//! resolution and file-backed source providers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod record;
pub mod resolve;
pub mod source;
pub mod stream;

pub use event::{Event, UNKNOWN_LINE};
pub use record::{Record, RecordKind, EXCEPTION};
pub use resolve::{load_completed, MethodDecl, ResolveError, ResolvedTable, SourceResolver};
pub use source::{FsSource, SourceCache};
pub use stream::{parse_records, read_lines, read_records, write_records, RecordWriter, StreamError};
