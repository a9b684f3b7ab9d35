//! Raw record handling - format detection, streaming and classification
//!
//! Everything here works on untyped JSON objects; turning them into
//! canonical book documents is the job of [`crate::books`].

pub mod classify;
pub mod detect;
pub mod reader;

pub use classify::{is_kind, RecordKind};
pub use detect::{detect_format, Detection, RecordFormat, DEFAULT_SAMPLE_LINES};
pub use reader::{ensure_extension, open_source, Record, RecordStream};
