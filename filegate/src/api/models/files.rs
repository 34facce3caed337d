use crate::uploads::UploadedFile;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Message returned with every successful upload.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "Files uploaded successfully";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    #[schema(example = "Files uploaded successfully")]
    pub message: String,
    /// One entry per uploaded file, in request order
    pub files: Vec<UploadedFile>,
    /// Acknowledgment of the downstream service, passed through unchanged (proxy mode only)
    #[serde(rename = "downstreamResponse", default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub downstream_response: Option<serde_json::Value>,
}

impl UploadResponse {
    pub fn new(files: Vec<UploadedFile>, downstream_response: Option<serde_json::Value>) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            files,
            downstream_response,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    /// Assigned names of the stored files
    pub files: Vec<String>,
}
