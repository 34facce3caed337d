//! HTTP request handlers.
//!
//! - [`files`]: upload, listing and download
//! - [`health`]: liveness
//!
//! Handlers return [`crate::errors::Result`], so every failure leaves through the single
//! [`crate::errors::Error`] to response mapping.

pub mod files;
pub mod health;

use crate::errors::ErrorResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};

/// Fallback for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
            message: None,
            retained_local_files: Vec::new(),
        }),
    )
}
