//! GovRAG HTTP server: router, shared state and error mapping.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::{search_defaults, AppState};
