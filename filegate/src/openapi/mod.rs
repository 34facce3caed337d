//! OpenAPI document served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::errors::ErrorResponse;
use crate::uploads::UploadedFile;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "filegate",
        description = "File ingestion gateway: validated multipart uploads, listing and download"
    ),
    paths(
        api::handlers::files::upload_files,
        api::handlers::files::list_files,
        api::handlers::files::download_file,
        api::handlers::health::health,
    ),
    components(
        schemas(
            api::models::files::UploadResponse,
            api::models::files::FileListResponse,
            api::models::health::HealthResponse,
            UploadedFile,
            ErrorResponse,
        )
    ),
    tags(
        (name = "files", description = "Upload, list and download files"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
