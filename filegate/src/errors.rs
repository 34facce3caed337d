use crate::downstream::DownstreamError;
use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload request carried no file parts
    #[error("No files uploaded.")]
    NoFilesUploaded,

    /// More file parts than the policy allows in one request
    #[error("Too many files. Maximum is {max} files.")]
    TooManyFiles { max: usize },

    /// A single file is above the per-file size ceiling
    #[error("File too large. Maximum size is {limit}.")]
    FileTooLarge { filename: String, limit: SizeLimit },

    /// Content type is not in the allow-list
    #[error("Invalid file type '{content_type}'. Allowed types: {allowed}.")]
    UnsupportedType {
        filename: String,
        content_type: String,
        allowed: String,
    },

    /// Zero-byte file while empty files are rejected
    #[error("Failed to store empty file {filename}")]
    EmptyFile { filename: String },

    /// Malformed request (broken multipart body, missing file name, ...)
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested file is absent or its name does not resolve inside the storage root
    #[error("File {filename} not found")]
    NotFound { filename: String },

    /// Local storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Downstream service failure. Files listed in `retained_files` were committed locally
    /// before the downstream call and are not rolled back.
    #[error("Downstream failure while {operation}: {source}")]
    Downstream {
        operation: String,
        #[source]
        source: DownstreamError,
        retained_files: Vec<String>,
    },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Byte ceiling rendered the way limit messages show it ("5MB", or raw bytes when the limit is
/// not a whole number of mebibytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit(pub u64);

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MIB: u64 = 1024 * 1024;
        if self.0 >= MIB && self.0 % MIB == 0 {
            write!(f, "{}MB", self.0 / MIB)
        } else {
            write!(f, "{} bytes", self.0)
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Assigned names of files that stayed in local storage although the request failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained_local_files: Vec<String>,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoFilesUploaded
            | Error::TooManyFiles { .. }
            | Error::FileTooLarge { .. }
            | Error::UnsupportedType { .. }
            | Error::EmptyFile { .. }
            | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Storage(_) | Error::Downstream { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound { .. } => "File not found".to_string(),
            Error::Storage(storage_err) => storage_err.user_message(),
            Error::Downstream { operation, .. } => format!("Error {operation}"),
            Error::Other(_) => "Internal server error".to_string(),
            client_error => client_error.to_string(),
        }
    }

    fn to_body(&self) -> ErrorResponse {
        match self {
            Error::Downstream {
                source, retained_files, ..
            } => ErrorResponse {
                error: self.user_message(),
                message: Some(if retained_files.is_empty() {
                    source.to_string()
                } else {
                    format!("{source}; files were kept in local storage and were not rolled back")
                }),
                retained_local_files: retained_files.clone(),
            },
            _ => ErrorResponse {
                error: self.user_message(),
                message: None,
                retained_local_files: Vec::new(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Storage(StorageError::NotFound(_)) => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Storage(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Downstream { retained_files, .. } if !retained_files.is_empty() => {
                tracing::warn!(
                    retained_files = ?retained_files,
                    "Downstream error after local commit, local files are not rolled back: {}",
                    self
                );
            }
            Error::Downstream { .. } => {
                tracing::warn!("Downstream error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.to_body())).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
