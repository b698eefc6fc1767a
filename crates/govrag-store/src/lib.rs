//! GovRAG Store — persistent vector index with snapshot reads and
//! similarity, score-threshold and MMR search.

pub mod index;
pub mod mmr;
pub mod schema;
pub mod types;

pub use index::{IndexSnapshot, VectorIndex};
pub use types::*;
