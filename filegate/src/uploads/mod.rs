//! Upload intake and validation.
//!
//! An upload request goes through three steps before anything touches the disk:
//!
//! 1. [`intake::read_files`] drains the multipart body into [`IncomingFile`]s, counting parts and
//!    bytes against the policy as they stream in.
//! 2. [`validation::UploadPolicy::validate`] screens the whole batch. Any violation rejects the
//!    entire request.
//! 3. The accepted batch is handed to [`crate::storage::FileStorage::store`], which assigns names
//!    and returns one [`UploadedFile`] per file.

pub mod intake;
pub mod validation;

pub use validation::UploadPolicy;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A file part read from an upload request, not yet validated or named.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Name supplied by the client. Untrusted, never used as a path.
    pub original_name: String,
    pub content_type: String,
    /// Number of bytes the client sent for this part
    pub size: u64,
    /// Part content, holding at most the policy's size ceiling. When `size` is above the
    /// ceiling this is only the leading bytes, and the file never passes validation.
    pub content: Bytes,
}

/// Metadata of a persisted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadedFile {
    /// Unique name the file is stored and retrieved under
    #[serde(rename = "filename")]
    pub assigned_name: String,
    /// Name supplied by the client
    #[serde(rename = "originalname")]
    pub original_name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "mimetype")]
    pub content_type: String,
}
