//! API state and the admin write gate.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tracing::warn;

use crate::contact::ContactNotifier;
use crate::error::{Error, Result};
use crate::repository::PropertyStore;
use crate::session::{self, SESSION_COOKIE, SessionGate};
use crate::storage::ImageStore;

/// State shared by API routes
pub struct AppState {
    /// Property persistence
    pub properties: PropertyStore,
    /// Image uploads and deletes
    pub images: ImageStore,
    /// Contact form delivery
    pub contact: ContactNotifier,
    /// Admin login and cookies
    pub session: SessionGate,
    /// Reject unauthenticated writes to properties and uploads
    pub require_session_for_writes: bool,
}

/// Whether the request carries a structurally valid admin cookie.
pub fn has_session(jar: &CookieJar) -> bool {
    jar.get(SESSION_COOKIE)
        .is_some_and(|cookie| session::check_session(cookie.value()))
}

/// Reject writes without an admin cookie when the gate is enabled. Reads always pass.
pub async fn require_admin_for_writes(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response> {
    let read_only = matches!(*request.method(), Method::GET | Method::HEAD);

    if state.require_session_for_writes && !read_only && !has_session(&jar) {
        warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected write without admin session"
        );
        return Err(Error::Unauthorized);
    }

    Ok(next.run(request).await)
}
