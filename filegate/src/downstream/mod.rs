//! Downstream storage service client (proxy mode).
//!
//! In proxy mode the gateway forwards accepted uploads, listings and downloads to a remote storage
//! service exposing `POST /api/upload`, `GET /api/files` and `GET /api/files/{filename}`.
//! Uploads are re-sent as a fresh multipart request built from the original bytes, original name
//! and content type; the remote acknowledgment is returned as opaque JSON. Listings and downloads
//! are relayed as-is without inspection or caching.

use crate::config::DownstreamConfig;
use crate::uploads::{IncomingFile, intake::FILES_FIELD};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode, multipart};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::{debug, instrument};
use url::Url;

/// A boxed stream of bytes for relaying response bodies.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Downstream failures. Messages are safe to show to callers; transport detail is only logged.
#[derive(ThisError, Debug)]
pub enum DownstreamError {
    #[error("downstream service timed out")]
    Timeout,

    #[error("downstream service is unreachable")]
    Unreachable,

    #[error("downstream service responded with status {0}")]
    Status(StatusCode),

    #[error("downstream service returned an invalid response")]
    InvalidResponse,
}

impl From<reqwest::Error> for DownstreamError {
    fn from(e: reqwest::Error) -> Self {
        tracing::debug!(error = %e, "Downstream request failed");
        if e.is_timeout() {
            DownstreamError::Timeout
        } else if let Some(status) = e.status() {
            DownstreamError::Status(status)
        } else if e.is_decode() {
            DownstreamError::InvalidResponse
        } else {
            DownstreamError::Unreachable
        }
    }
}

/// A downstream response passed through to the caller byte for byte.
pub struct RelayedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub content_disposition: Option<HeaderValue>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl RelayedResponse {
    fn from_reqwest(response: reqwest::Response) -> Self {
        let headers = response.headers();
        let content_type = headers.get(reqwest::header::CONTENT_TYPE).cloned();
        let content_disposition = headers.get(reqwest::header::CONTENT_DISPOSITION).cloned();
        Self {
            status: response.status(),
            content_type,
            content_disposition,
            content_length: response.content_length(),
            body: Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other))),
        }
    }
}

impl IntoResponse for RelayedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Body::from_stream(self.body)).into_response();
        let headers = response.headers_mut();
        if let Some(content_type) = self.content_type {
            headers.insert(header::CONTENT_TYPE, content_type);
        }
        if let Some(disposition) = self.content_disposition {
            headers.insert(header::CONTENT_DISPOSITION, disposition);
        }
        if let Some(length) = self.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        response
    }
}

/// Operations the gateway needs from the downstream storage service.
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Forward an accepted batch and return the service's JSON acknowledgment.
    async fn upload(&self, files: &[IncomingFile]) -> Result<serde_json::Value, DownstreamError>;

    /// Fetch the service's file listing.
    async fn list(&self) -> Result<RelayedResponse, DownstreamError>;

    /// Fetch one file. A 404 from the service is reported as `Ok(None)`.
    async fn download(&self, filename: &str) -> Result<Option<RelayedResponse>, DownstreamError>;
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Re-package an accepted upload with its original name, content type and bytes.
fn file_part(file: &IncomingFile) -> multipart::Part {
    let part = || multipart::Part::stream_with_length(file.content.clone(), file.size).file_name(file.original_name.clone());
    // Only reachable for types the allow-list accepted but reqwest cannot parse
    part().mime_str(&file.content_type).unwrap_or_else(|_| part())
}

/// The `reqwest` implementation of [`Downstream`].
///
/// The configured timeout bounds sending a request and waiting for the response headers. After
/// that it only applies to a body that stalls, relayed bodies stream for as long as the service
/// keeps sending.
pub struct DownstreamReqwest {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl DownstreamReqwest {
    pub fn new(config: &DownstreamConfig) -> anyhow::Result<Self> {
        crate::install_crypto_provider();
        let client = Client::builder()
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .read_timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: ensure_slash(&config.url),
            timeout: config.timeout,
        })
    }

    /// Send a request, giving up if the response headers do not arrive within the timeout.
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, DownstreamError> {
        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(response) => Ok(response?),
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "Downstream request timed out");
                Err(DownstreamError::Timeout)
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DownstreamError> {
        self.base_url.join(path).map_err(|e| {
            tracing::error!(base_url = %self.base_url, path, error = %e, "Invalid downstream URL");
            DownstreamError::Unreachable
        })
    }

    /// `{base}/api/files/{filename}`, with the name percent-encoded as one path segment.
    fn file_endpoint(&self, filename: &str) -> Result<Url, DownstreamError> {
        let mut url = self.endpoint("api/files/")?;
        url.path_segments_mut()
            .map_err(|_| DownstreamError::Unreachable)?
            .pop_if_empty()
            .push(filename);
        Ok(url)
    }
}

#[async_trait]
impl Downstream for DownstreamReqwest {
    #[instrument(skip_all, fields(files = files.len()))]
    async fn upload(&self, files: &[IncomingFile]) -> Result<serde_json::Value, DownstreamError> {
        let url = self.endpoint("api/upload")?;

        let form = files
            .iter()
            .fold(multipart::Form::new(), |form, file| form.part(FILES_FIELD, file_part(file)));

        debug!(%url, "Forwarding upload to downstream service");
        let response = self.send(self.client.post(url).multipart(form)).await?.error_for_status()?;
        Ok(response.json::<serde_json::Value>().await?)
    }

    async fn list(&self) -> Result<RelayedResponse, DownstreamError> {
        let url = self.endpoint("api/files")?;
        debug!(%url, "Listing files on downstream service");
        let response = self.send(self.client.get(url)).await?.error_for_status()?;
        Ok(RelayedResponse::from_reqwest(response))
    }

    async fn download(&self, filename: &str) -> Result<Option<RelayedResponse>, DownstreamError> {
        let url = self.file_endpoint(filename)?;
        debug!(%url, "Downloading file from downstream service");
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(RelayedResponse::from_reqwest(response)))
    }
}
