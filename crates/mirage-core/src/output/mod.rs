pub mod text;
pub mod writer;

pub use text::{batch_path, format_row, NULL_MARKER};
pub use writer::{BatchWriter, WrittenBatch};
