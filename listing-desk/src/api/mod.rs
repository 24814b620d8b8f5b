//! HTTP JSON API.
//!
//! Provides the `/api` routes for listings, images, admin sessions and the
//! contact form.

mod extract;
mod middleware;
mod routes;

pub use extract::ValidJson;
pub use middleware::{AppState, has_session};
pub use routes::api_router;

use axum::Router;
use std::sync::Arc;

/// Build the full HTTP router with the API nested under `/api`.
pub fn http_router(state: Arc<AppState>) -> Router {
    Router::new().nest("/api", api_router(state))
}
