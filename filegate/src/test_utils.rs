//! Test utilities for end-to-end HTTP tests.

use crate::config::{Config, DownstreamConfig, StorageConfig};
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Config with defaults and storage rooted at `upload_dir`.
pub fn create_test_config(upload_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig {
            upload_dir: upload_dir.to_path_buf(),
        },
        ..Default::default()
    }
}

/// Proxy mode config pointing at `downstream_url` (usually a wiremock server).
pub fn create_proxy_test_config(upload_dir: &Path, downstream_url: &str) -> Config {
    Config {
        downstream: Some(DownstreamConfig {
            url: downstream_url.parse().expect("Invalid downstream url"),
            timeout: Duration::from_secs(2),
        }),
        ..create_test_config(upload_dir)
    }
}

pub async fn create_test_server(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Local mode server on a fresh temp directory. Keep the `TempDir` alive for the test's duration.
pub async fn create_test_app() -> (TestServer, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = create_test_server(create_test_config(dir.path())).await;
    (server, dir)
}

/// A `files` part as a browser would send it.
pub fn file_part(name: &str, content_type: &str, content: impl Into<Vec<u8>>) -> Part {
    Part::bytes(content.into()).file_name(name).mime_type(content_type)
}

/// Multipart form with one `files` part per `(name, content_type, content)`.
pub fn files_form<'a>(files: impl IntoIterator<Item = (&'a str, &'a str, Vec<u8>)>) -> MultipartForm {
    files
        .into_iter()
        .fold(MultipartForm::new(), |form, (name, content_type, content)| {
            form.add_part("files", file_part(name, content_type, content))
        })
}

/// Bytes of chunk `i` sent by [`spawn_slow_downstream`].
fn slow_chunk(i: usize) -> Vec<u8> {
    vec![b'a' + (i % 26) as u8; 1024]
}

/// Full body [`spawn_slow_downstream`] serves for `chunks` chunks.
pub fn slow_downstream_body(chunks: usize) -> Vec<u8> {
    (0..chunks).flat_map(slow_chunk).collect()
}

/// Downstream stand-in serving `GET /api/files/{name}` as `chunks` 1KiB chunks, each sent after
/// `delay`. Returns its base URL.
pub async fn spawn_slow_downstream(chunks: usize, delay: Duration) -> String {
    use axum::{Router, body::Body, http::header, routing::get};
    use futures::StreamExt;

    let app = Router::new().route(
        "/api/files/{name}",
        get(move || async move {
            let stream = futures::stream::iter(0..chunks).then(move |i| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, std::io::Error>(bytes::Bytes::from(slow_chunk(i)))
            });
            ([(header::CONTENT_TYPE, "application/octet-stream")], Body::from_stream(stream))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind slow downstream");
    let addr = listener.local_addr().expect("Slow downstream has no address");
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}
