//! Upload validation policy.
//!
//! Rules are strict: the batch-level count rule is checked first, then each file in arrival order
//! (content type, then size, then emptiness). The first violation rejects the whole batch, so
//! either every file of a request is stored or none is.

use super::IncomingFile;
use crate::config::UploadsConfig;
use crate::errors::{Error, Result, SizeLimit};
use std::collections::BTreeSet;

/// Slack on top of the summed file limits for multipart boundaries, headers and text fields.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Normalize a MIME string to its lowercase essence (`Text/Plain; charset=utf-8` -> `text/plain`).
fn mime_essence(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Process-wide upload limits, built once from configuration.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_content_types: BTreeSet<String>,
    max_file_size: u64,
    max_file_count: usize,
    allow_empty_files: bool,
}

impl UploadPolicy {
    pub fn from_config(config: &UploadsConfig) -> Self {
        Self {
            allowed_content_types: config.allowed_content_types.iter().map(|t| mime_essence(t)).collect(),
            max_file_size: config.max_file_size,
            max_file_count: config.max_file_count,
            allow_empty_files: config.allow_empty_files,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_file_count(&self) -> usize {
        self.max_file_count
    }

    /// Upper bound for a whole upload request body.
    ///
    /// Enough for `max_file_count` files at the size ceiling. A body above this necessarily
    /// carries an oversized file, so hitting it is reported as [`Error::FileTooLarge`].
    pub fn request_body_limit(&self) -> usize {
        let limit = self
            .max_file_size
            .saturating_mul(self.max_file_count as u64)
            .saturating_add(MULTIPART_OVERHEAD);
        usize::try_from(limit).unwrap_or(usize::MAX)
    }

    pub fn is_allowed_type(&self, content_type: &str) -> bool {
        self.allowed_content_types.contains(&mime_essence(content_type))
    }

    pub fn file_too_large(&self, filename: &str) -> Error {
        Error::FileTooLarge {
            filename: filename.to_string(),
            limit: SizeLimit(self.max_file_size),
        }
    }

    /// Batch-level rule, applied before any individual file is looked at.
    pub fn check_count(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::NoFilesUploaded);
        }
        if count > self.max_file_count {
            return Err(Error::TooManyFiles { max: self.max_file_count });
        }
        Ok(())
    }

    pub fn check_file(&self, file: &IncomingFile) -> Result<()> {
        if !self.is_allowed_type(&file.content_type) {
            return Err(Error::UnsupportedType {
                filename: file.original_name.clone(),
                content_type: file.content_type.clone(),
                allowed: self.allowed_content_types.iter().cloned().collect::<Vec<_>>().join(", "),
            });
        }
        if file.size > self.max_file_size {
            return Err(self.file_too_large(&file.original_name));
        }
        if file.size == 0 && !self.allow_empty_files {
            return Err(Error::EmptyFile {
                filename: file.original_name.clone(),
            });
        }
        Ok(())
    }

    /// Screen a whole batch. Nothing has been written when this returns an error.
    pub fn validate(&self, files: &[IncomingFile]) -> Result<()> {
        self.check_count(files.len())?;
        for file in files {
            self.check_file(file).inspect_err(|e| {
                tracing::info!(
                    original_name = %file.original_name,
                    content_type = %file.content_type,
                    size = file.size,
                    reason = %e,
                    "Rejecting upload batch"
                );
            })?;
        }
        Ok(())
    }
}
