//! Multipart intake for upload requests.

use super::{IncomingFile, UploadPolicy};
use crate::errors::{Error, Result};
use axum::extract::Multipart;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use bytes::BytesMut;
use tracing::{debug, warn};

/// Multipart field carrying the uploaded files.
pub const FILES_FIELD: &str = "files";

fn multipart_error(err: MultipartError, policy: &UploadPolicy, filename: Option<&str>) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(filename = ?filename, "Upload body exceeded request limit");
        return policy.file_too_large(filename.unwrap_or_default());
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", err.body_text()),
    }
}

/// Map a request that could not be read as multipart at all.
///
/// A missing or non-multipart content type means the request carries no file parts.
pub fn rejection_error(rejection: MultipartRejection) -> Error {
    match rejection {
        MultipartRejection::InvalidBoundary(_) => Error::NoFilesUploaded,
        other => Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", other.body_text()),
        },
    }
}

/// Read every `files` part of an upload request.
///
/// Other fields are skipped. Part counting happens as parts arrive: as soon as one more part than
/// the policy allows shows up, the request is rejected without reading further. Bytes beyond the
/// per-file ceiling are counted but not buffered, so a single oversized part costs no memory.
///
/// Parts are only counted while the body stays under [`UploadPolicy::request_body_limit`]. A body
/// that trips the limit inside an oversized part is reported as too large, even if more parts
/// than allowed were still to come.
pub async fn read_files(multipart: &mut Multipart, policy: &UploadPolicy) -> Result<Vec<IncomingFile>> {
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, policy, None))? {
        if field.name() != Some(FILES_FIELD) {
            debug!(field = ?field.name(), "Ignoring non-file multipart field");
            continue;
        }

        if files.len() == policy.max_file_count() {
            return Err(Error::TooManyFiles {
                max: policy.max_file_count(),
            });
        }

        let original_name = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::BadRequest {
                message: "File name cannot be empty".to_string(),
            })?;

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(&original_name).first_or_octet_stream().to_string());

        let mut size = 0u64;
        let mut content = BytesMut::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, policy, Some(&original_name)))?
        {
            let room = policy.max_file_size().saturating_sub(content.len() as u64);
            let keep = chunk.len().min(usize::try_from(room).unwrap_or(usize::MAX));
            content.extend_from_slice(&chunk[..keep]);
            size += chunk.len() as u64;
        }

        debug!(
            original_name = %original_name,
            content_type = %content_type,
            size,
            "Received file part"
        );

        files.push(IncomingFile {
            original_name,
            content_type,
            size,
            content: content.freeze(),
        });
    }

    Ok(files)
}
