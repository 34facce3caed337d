//! Local persistence of uploaded files.
//!
//! The [`FileStorage`] trait is the seam between the HTTP handlers and the disk. The only
//! implementation is [`LocalFileStorage`], which keeps a flat directory of files named by
//! [`naming::assign_name`]; the directory listing is the source of truth, there is no index.

pub mod local;
pub mod naming;

pub use local::LocalFileStorage;
pub use naming::AssignedName;

use crate::uploads::{IncomingFile, UploadedFile};
use async_trait::async_trait;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum StorageError {
    /// File is absent, or its name cannot resolve to a file inside the storage root
    #[error("File {0} not found")]
    NotFound(String),

    /// Filesystem failure (disk full, permission denied, ...)
    #[error("Failed to {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The detached write task panicked or was aborted
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StorageError {
    /// Message safe to show to callers; the underlying I/O error is only logged.
    pub fn user_message(&self) -> String {
        match self {
            StorageError::NotFound(_) => "File not found".to_string(),
            StorageError::Io { operation, .. } => format!("Could not {operation}"),
            StorageError::Task(_) => "Error uploading files".to_string(),
        }
    }
}

pub(crate) fn io_error(operation: &'static str) -> impl FnOnce(std::io::Error) -> StorageError {
    move |source| StorageError::Io { operation, source }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// An opened stored file, ready to be streamed back.
#[derive(Debug)]
pub struct StoredFile {
    pub name: AssignedName,
    pub size: u64,
    /// Content type guessed from the stored name
    pub content_type: String,
    pub file: tokio::fs::File,
}

/// Trait for upload storage backends
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Make sure the storage root exists. Idempotent and safe to race.
    async fn ensure_root(&self) -> Result<()>;

    /// Persist an already validated batch, assigning each file a fresh name.
    ///
    /// Each file is either fully visible under its assigned name or absent.
    async fn store(&self, files: Vec<IncomingFile>) -> Result<Vec<UploadedFile>>;

    /// Names of all stored files, in filesystem order.
    async fn list(&self) -> Result<Vec<String>>;

    /// Open a stored file by its assigned name.
    async fn open(&self, name: &str) -> Result<StoredFile>;
}
