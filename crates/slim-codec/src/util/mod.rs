//! Utility modules.

pub mod walker;

pub use walker::{element_count, walk_read, walk_write, IndexWalker, NdArray};
