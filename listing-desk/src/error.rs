//! Error types for listing-desk.
//!
//! Every failure a request can hit is one variant here. The `IntoResponse`
//! impl maps each variant to its HTTP status and a JSON body of the form
//! `{"error": "<kind>", "message": "<text>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Service error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Field-level validation failures from a typed request body.
    #[error("Invalid data")]
    InvalidFields(#[from] validator::ValidationErrors),

    /// Identifier is not a well-formed property id.
    #[error("Invalid property id: {0}")]
    InvalidId(String),

    /// Entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Username/password mismatch.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Request needs an admin session it does not carry.
    #[error("Admin session required")]
    Unauthorized,

    /// Required server secret is missing.
    #[error("Server configuration error: {0}")]
    Configuration(&'static str),

    /// Database failure.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Stored row could not be decoded.
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    /// Upload MIME type outside the allow-list.
    #[error("Invalid file type: {0}. Only JPG, PNG, and WebP are allowed.")]
    InvalidFileType(String),

    /// Upload larger than the size limit.
    #[error("File size {size} exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    /// Object store rejected an upload.
    #[error("Error uploading image: {0}")]
    Upload(String),

    /// Image URL does not contain the bucket segment.
    #[error("Invalid image URL format")]
    InvalidUrlFormat,

    /// Object store rejected a delete or list.
    #[error("Error deleting image: {0}")]
    Delete(String),

    /// Email provider rejected the message.
    #[error("Email delivery failed: {0}")]
    Delivery(String),

    /// Email body failed to render.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl Error {
    /// Short machine-readable kind used in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::InvalidFields(_) => "validation_error",
            Error::InvalidId(_) => "invalid_id",
            Error::NotFound(_) => "not_found",
            Error::InvalidCredentials | Error::Unauthorized => "auth_error",
            Error::Configuration(_) => "configuration_error",
            Error::Storage(_) | Error::CorruptRecord { .. } => "storage_error",
            Error::InvalidFileType(_) => "invalid_file_type",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::Upload(_) => "upload_error",
            Error::InvalidUrlFormat => "invalid_url_format",
            Error::Delete(_) => "delete_error",
            Error::Delivery(_) => "delivery_error",
            Error::Template(_) => "template_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::InvalidFields(_)
            | Error::InvalidId(_)
            | Error::InvalidFileType(_)
            | Error::FileTooLarge { .. }
            | Error::InvalidUrlFormat => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Configuration(_)
            | Error::Storage(_)
            | Error::CorruptRecord { .. }
            | Error::Upload(_)
            | Error::Delete(_)
            | Error::Delivery(_)
            | Error::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self);
        }

        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        if let Error::InvalidFields(errors) = &self {
            let details: Vec<_> = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| {
                        json!({
                            "field": field,
                            "message": e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string()),
                        })
                    })
                })
                .collect();
            body["details"] = details.into();
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for listing-desk.
pub type Result<T, E = Error> = std::result::Result<T, E>;
