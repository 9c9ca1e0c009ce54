//! Thin HTTP boundary over the generation pipeline. Routes translate
//! requests into core calls and schedule background work; no business
//! logic lives here.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
