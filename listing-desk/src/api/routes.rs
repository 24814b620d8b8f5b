//! API route handlers.
//!
//! Provides the JSON endpoints used by the public site and the admin UI:
//! auth, property CRUD, image upload/delete and the contact form.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::extract::ValidJson;
use crate::api::middleware::{AppState, has_session, require_admin_for_writes};
use crate::contact::ContactRequest;
use crate::error::{Error, Result};
use crate::property::{ActiveFilter, CreatePropertyRequest, UpdatePropertyRequest};
use crate::session::SESSION_COOKIE;
use crate::storage::ImageUpload;

/// Request body ceiling for uploads. Larger than the image limit so that
/// oversized files reach the handler and get a proper size error.
const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Build the API router (mounted under `/api`).
pub fn api_router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route(
            "/properties",
            get(list_properties).post(create_property),
        )
        .route("/properties/stats", get(property_stats))
        .route(
            "/properties/{id}",
            get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
        .route(
            "/upload",
            post(upload_image)
                .delete(delete_image)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_for_writes,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session_status))
        .route("/contact", post(submit_contact))
        .route("/health", get(|| async { "ok" }))
        .merge(guarded)
        .with_state(state)
}

// =============================================================================
// Auth
// =============================================================================

/// Login body.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<LoginRequest>,
) -> Result<Response> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(Error::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let token = state.session.login(&body.username, &body.password)?;

    Ok((
        [(header::SET_COOKIE, state.session.session_cookie(&token))],
        Json(json!({
            "success": true,
            "token": token,
            "message": "Login successful",
        })),
    )
        .into_response())
}

async fn logout(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::SET_COOKIE, state.session.cleared_cookie())],
        Json(json!({
            "success": true,
            "message": "Logout successful",
        })),
    )
        .into_response()
}

/// Report whether the caller holds an admin session. A cookie that does
/// not decode is cleared.
async fn session_status(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let authenticated = has_session(&jar);
    let body = Json(json!({ "authenticated": authenticated }));

    if !authenticated && jar.get(SESSION_COOKIE).is_some() {
        debug!("Clearing invalid admin cookie");
        return ([(header::SET_COOKIE, state.session.cleared_cookie())], body).into_response();
    }

    body.into_response()
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Deserialize)]
pub struct ListQuery {
    active: Option<String>,
}

async fn list_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let filter = ActiveFilter::from_query(query.active.as_deref())?;
    Ok(Json(state.properties.list(filter).await?).into_response())
}

async fn property_stats(State(state): State<Arc<AppState>>) -> Result<Response> {
    Ok(Json(state.properties.stats().await?).into_response())
}

async fn create_property(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<CreatePropertyRequest>,
) -> Result<Response> {
    let property = state.properties.create(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Property created successfully",
            "property": property,
        })),
    )
        .into_response())
}

async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    Ok(Json(state.properties.get(&id).await?).into_response())
}

async fn update_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<UpdatePropertyRequest>,
) -> Result<Response> {
    let property = state.properties.update(&id, body).await?;
    Ok(Json(json!({
        "message": "Property updated successfully",
        "property": property,
    }))
    .into_response())
}

async fn delete_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let deleted = state.properties.delete(&id).await?;
    Ok(Json(json!({
        "message": "Property deleted successfully",
        "deletedProperty": deleted,
    }))
    .into_response())
}

// =============================================================================
// Images
// =============================================================================

async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut file = None;
    let mut property_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(e.body_text()))?;
                file = Some(ImageUpload {
                    file_name,
                    content_type,
                    body,
                });
            }
            "propertyId" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(e.body_text()))?;
                property_id = Some(value);
            }
            _ => {}
        }
    }

    let Some(file) = file else {
        return Err(Error::Validation("No file provided".to_string()));
    };
    let Some(property_id) = property_id.filter(|id| !id.trim().is_empty()) else {
        return Err(Error::Validation("Property ID is required".to_string()));
    };

    let image_url = state.images.upload(file, &property_id).await?;

    Ok(Json(json!({
        "message": "Image uploaded successfully",
        "imageUrl": image_url,
    }))
    .into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageQuery {
    image_url: Option<String>,
}

async fn delete_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteImageQuery>,
) -> Result<Response> {
    let Some(image_url) = query.image_url.filter(|url| !url.is_empty()) else {
        return Err(Error::Validation("Image URL is required".to_string()));
    };

    state.images.delete(&image_url).await?;

    Ok(Json(json!({ "message": "Image deleted successfully" })).into_response())
}

// =============================================================================
// Contact
// =============================================================================

async fn submit_contact(
    State(state): State<Arc<AppState>>,
    ValidJson(body): ValidJson<ContactRequest>,
) -> Result<Response> {
    state.contact.submit(body).await?;
    info!("Contact form submitted");
    Ok(Json(json!({ "message": "Message sent successfully" })).into_response())
}
