//! One immutable, on-disk segment: its file layout, writer, and reader.

pub mod format;
pub mod reader;
pub mod writer;
