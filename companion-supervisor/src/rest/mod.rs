//! HTTP adapter over the supervisor.

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::{ApiDoc, create_router};
