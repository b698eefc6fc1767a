//! GovRAG Resolve — retrieval over the vector index and grounded answers.

pub mod answer;
pub mod retrieval;
pub mod types;

pub use answer::QueryEngine;
pub use retrieval::Retriever;
pub use types::*;
