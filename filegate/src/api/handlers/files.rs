use crate::AppState;
use crate::api::models::files::{FileListResponse, UploadResponse};
use crate::errors::{Error, ErrorResponse, Result};
use crate::uploads::intake;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

#[utoipa::path(
    post,
    path = "/upload",
    tag = "files",
    summary = "Upload files",
    description = "Upload one or more files as `files` parts of a multipart form. The whole batch is validated \
    (file count, content type, size) before anything is stored; one invalid file rejects the request. \
    In proxy mode the files are also forwarded to the downstream service. Also served at `/api/upload`.",
    request_body(
        content_type = "multipart/form-data",
        description = "One `files` part per file"
    ),
    responses(
        (status = 200, description = "Files uploaded successfully", body = UploadResponse),
        (status = 400, description = "No files, too many files, file too large, unsupported type or malformed request", body = ErrorResponse),
        (status = 500, description = "Storage or downstream failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(intake::rejection_error)?;
    let files = intake::read_files(&mut multipart, &state.policy).await?;
    state.policy.validate(&files)?;

    // Bytes are refcounted, the downstream gets the original parts after the local commit
    let forwarded = state.downstream.as_ref().map(|_| files.clone());

    let stored = state.storage.store(files).await?;
    info!(count = stored.len(), "Stored upload batch");

    let downstream_response = match (&state.downstream, forwarded) {
        (Some(downstream), Some(forwarded)) => {
            let ack = downstream.upload(&forwarded).await.map_err(|source| Error::Downstream {
                operation: "uploading files".to_string(),
                source,
                retained_files: stored.iter().map(|f| f.assigned_name.clone()).collect(),
            })?;
            Some(ack)
        }
        _ => None,
    };

    Ok(Json(UploadResponse::new(stored, downstream_response)))
}

#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    summary = "List files",
    description = "Returns the assigned names of all stored files. In proxy mode the downstream listing is relayed \
    unchanged. Also served at `/api/files`.",
    responses(
        (status = 200, description = "List of files", body = FileListResponse),
        (status = 500, description = "Storage or downstream failure", body = ErrorResponse)
    )
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Response> {
    if let Some(downstream) = &state.downstream {
        let relayed = downstream.list().await.map_err(|source| Error::Downstream {
            operation: "listing files".to_string(),
            source,
            retained_files: Vec::new(),
        })?;
        return Ok(relayed.into_response());
    }

    let files = state.storage.list().await?;
    Ok(Json(FileListResponse { files }).into_response())
}

#[utoipa::path(
    get,
    path = "/files/{filename}",
    tag = "files",
    summary = "Download file",
    description = "Streams a stored file as an attachment. Names that do not resolve to a file inside the upload \
    directory are reported as not found. Also served at `/api/files/{filename}`.",
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Storage or downstream failure", body = ErrorResponse)
    ),
    params(
        ("filename" = String, Path, description = "Assigned name returned by the upload")
    )
)]
#[instrument(skip(state))]
pub async fn download_file(State(state): State<AppState>, Path(filename): Path<String>) -> Result<Response> {
    if let Some(downstream) = &state.downstream {
        return match downstream.download(&filename).await {
            Ok(Some(relayed)) => Ok(relayed.into_response()),
            Ok(None) => Err(Error::NotFound { filename }),
            Err(source) => Err(Error::Downstream {
                operation: "downloading file".to_string(),
                source,
                retained_files: Vec::new(),
            }),
        };
    }

    let stored = state.storage.open(&filename).await?;
    let headers = [
        (header::CONTENT_TYPE, stored.content_type),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", stored.name)),
        (header::CONTENT_LENGTH, stored.size.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(stored.file));

    Ok((headers, body).into_response())
}
