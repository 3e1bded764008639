//! PDF writing: object serialization and incremental revisions.

mod incremental;
mod object_serializer;

pub use incremental::{find_startxref, IncrementalWriter};
pub use object_serializer::{bytes_to_hex, ObjectSerializer, RawEntry};
