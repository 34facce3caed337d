//! Local filesystem storage backend.

use super::naming::{AssignedName, assign_name};
use super::{FileStorage, Result, StorageError, StoredFile, io_error};
use crate::uploads::{IncomingFile, UploadedFile};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stores uploads as plain files directly under `root`.
///
/// In-flight writes go to hidden `.<uuid>.partial` files in the same directory and are renamed
/// into place once flushed, so a file never appears under its assigned name half-written.
pub struct LocalFileStorage {
    root: PathBuf,
    initialized: OnceCell<()>,
}

impl LocalFileStorage {
    /// Create a backend rooted at `root`. The directory is created lazily on first use.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            initialized: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn create_root(root: &Path) -> Result<()> {
    match fs::create_dir_all(root).await {
        Ok(()) => {}
        // Another caller won the race between the existence check and mkdir
        Err(e) if e.kind() == ErrorKind::AlreadyExists && root.is_dir() => {}
        Err(e) => return Err(io_error("create upload directory")(e)),
    }
    info!(root = %root.display(), "Upload directory ready");
    Ok(())
}

async fn write_atomically(root: &Path, name: &AssignedName, content: &[u8]) -> Result<()> {
    let final_path = root.join(name.as_str());
    let temp_path = root.join(format!(".{}.partial", Uuid::new_v4()));

    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &final_path).await
    }
    .await;

    if let Err(source) = written {
        if let Err(e) = fs::remove_file(&temp_path).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove partial upload");
        }
        return Err(StorageError::Io {
            operation: "write file",
            source,
        });
    }

    Ok(())
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn ensure_root(&self) -> Result<()> {
        self.initialized.get_or_try_init(|| create_root(&self.root)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(files = files.len()))]
    async fn store(&self, files: Vec<IncomingFile>) -> Result<Vec<UploadedFile>> {
        self.ensure_root().await?;
        let root = self.root.clone();

        // Detached so that a client hanging up mid-request cannot cancel a write that has started
        let stored = tokio::spawn(async move {
            let mut stored = Vec::with_capacity(files.len());
            for file in files {
                let name = assign_name(&file.original_name);
                write_atomically(&root, &name, &file.content).await?;
                debug!(
                    assigned_name = %name,
                    original_name = %file.original_name,
                    size = file.size,
                    "Stored upload"
                );
                stored.push(UploadedFile {
                    assigned_name: name.into_string(),
                    original_name: file.original_name,
                    size_bytes: file.size,
                    content_type: file.content_type,
                });
            }
            Ok::<_, StorageError>(stored)
        })
        .await??;

        Ok(stored)
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.ensure_root().await?;

        let mut entries = fs::read_dir(&self.root).await.map_err(io_error("read upload directory"))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error("read upload directory"))? {
            let file_type = entry.file_type().await.map_err(io_error("read upload directory"))?;
            if !file_type.is_file() {
                continue;
            }
            // Hidden entries are in-flight writes
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                _ => {}
            }
        }

        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<StoredFile> {
        let not_found = || StorageError::NotFound(name.to_string());

        let assigned = AssignedName::parse(name).ok_or_else(not_found)?;
        self.ensure_root().await?;

        let root = fs::canonicalize(&self.root).await.map_err(io_error("open upload directory"))?;
        let path = match fs::canonicalize(root.join(assigned.as_str())).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_error("open file")(e)),
        };
        // A symlink inside the root could still point elsewhere
        if path.parent() != Some(root.as_path()) {
            tracing::warn!(name, resolved = %path.display(), "Refusing to serve file resolving outside upload directory");
            return Err(not_found());
        }

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_error("open file")(e)),
        };
        let metadata = file.metadata().await.map_err(io_error("open file"))?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let content_type = mime_guess::from_path(assigned.as_str()).first_or_octet_stream().to_string();
        Ok(StoredFile {
            name: assigned,
            size: metadata.len(),
            content_type,
            file,
        })
    }
}
