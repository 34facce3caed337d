//! End-to-end tests through the full router.


use crate::api::models::files::{FileListResponse, UploadResponse};
use crate::errors::ErrorResponse;
use crate::test_utils::{create_test_app, create_test_config, create_test_server, file_part, files_form};
use crate::uploads::UploadedFile;
use axum::http::{StatusCode, header};
use axum_test::multipart::MultipartForm;
use std::collections::HashSet;

const MIB: usize = 1024 * 1024;

fn text_files(count: usize) -> MultipartForm {
    (0..count).fold(MultipartForm::new(), |form, i| {
        form.add_part("files", file_part(&format!("file-{i}.txt"), "text/plain", format!("content {i}")))
    })
}

#[tokio::test]
#[test_log::test]
async fn test_upload_single_file() {
    let (server, dir) = create_test_app().await;

    let response = server
        .post("/upload")
        .multipart(files_form([("report.pdf", "application/pdf", b"%PDF-1.4 fake".to_vec())]))
        .await;

    response.assert_status_ok();
    let body: UploadResponse = response.json();
    assert_eq!(body.message, "Files uploaded successfully");
    assert!(body.downstream_response.is_none());
    assert_eq!(body.files.len(), 1);

    let file = &body.files[0];
    assert_eq!(file.original_name, "report.pdf");
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.size_bytes, 13);
    assert!(file.assigned_name.ends_with("-report.pdf"));
    assert!(dir.path().join(&file.assigned_name).is_file());
}

#[tokio::test]
#[test_log::test]
async fn test_upload_response_uses_wire_field_names() {
    let (server, _dir) = create_test_app().await;

    let response = server.post("/upload").multipart(text_files(1)).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let file = &body["files"][0];
    for field in ["filename", "originalname", "size", "mimetype"] {
        assert!(file.get(field).is_some(), "missing {field} in {file}");
    }
    assert!(body.get("downstreamResponse").is_none());
}

#[tokio::test]
#[test_log::test]
async fn test_upload_up_to_max_files_gets_distinct_names() {
    let (server, _dir) = create_test_app().await;

    for count in 1..=5 {
        let response = server.post("/upload").multipart(text_files(count)).await;
        response.assert_status_ok();
        let body: UploadResponse = response.json();
        assert_eq!(body.files.len(), count);

        let names: HashSet<_> = body.files.iter().map(|f| f.assigned_name.clone()).collect();
        assert_eq!(names.len(), count);
        // Request order is preserved
        for (i, file) in body.files.iter().enumerate() {
            assert_eq!(file.original_name, format!("file-{i}.txt"));
        }
    }
}

#[tokio::test]
#[test_log::test]
async fn test_too_many_files_rejected_without_writes() {
    let (server, dir) = create_test_app().await;

    let response = server.post("/upload").multipart(text_files(6)).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "Too many files. Maximum is 5 files.");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
#[test_log::test]
async fn test_oversized_file_rejected() {
    let (server, dir) = create_test_app().await;

    let response = server
        .post("/upload")
        .multipart(files_form([
            ("small.txt", "text/plain", b"fine".to_vec()),
            ("big.txt", "text/plain", vec![b'x'; 6 * MIB]),
        ]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("too large"), "{}", body.error);
    assert_eq!(body.error, "File too large. Maximum size is 5MB.");
    // The valid file of the batch is not stored either
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
#[test_log::test]
async fn test_file_at_size_limit_accepted() {
    let (server, _dir) = create_test_app().await;

    let response = server
        .post("/upload")
        .multipart(files_form([("exact.txt", "text/plain", vec![b'x'; 5 * MIB])]))
        .await;

    response.assert_status_ok();
    let body: UploadResponse = response.json();
    assert_eq!(body.files[0].size_bytes, 5 * MIB as u64);
}

#[tokio::test]
#[test_log::test]
async fn test_empty_upload_rejected() {
    let (server, _dir) = create_test_app().await;

    let response = server
        .post("/upload")
        .multipart(MultipartForm::new().add_text("description", "no files here"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "No files uploaded.");
}

#[tokio::test]
#[test_log::test]
async fn test_non_multipart_upload_is_json_400() {
    let (server, _dir) = create_test_app().await;

    let bare = server.post("/upload").await;
    let json = server.post("/api/upload").json(&serde_json::json!({ "files": [] })).await;

    for response in [bare, json] {
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "error": "No files uploaded." }));
    }
}

#[tokio::test]
#[test_log::test]
async fn test_count_checked_before_oversized_file() {
    let (server, _dir) = create_test_app().await;

    // The body stays under the request limit, so every part is seen
    let mut form = MultipartForm::new().add_part("files", file_part("big.txt", "text/plain", vec![b'x'; 6 * MIB]));
    for i in 0..5 {
        form = form.add_part("files", file_part(&format!("extra-{i}.txt"), "text/plain", "x"));
    }
    let response = server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "Too many files. Maximum is 5 files.");
}

#[tokio::test]
#[test_log::test]
async fn test_body_over_request_limit_reported_too_large() {
    let (server, dir) = create_test_app().await;

    // 5 x 5MiB + 1MiB overhead is the request limit, a single 30MiB part trips it first
    let mut form = MultipartForm::new().add_part("files", file_part("huge.txt", "text/plain", vec![b'x'; 30 * MIB]));
    for i in 0..5 {
        form = form.add_part("files", file_part(&format!("extra-{i}.txt"), "text/plain", "x"));
    }
    let response = server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "File too large. Maximum size is 5MB.");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
#[test_log::test]
async fn test_unsupported_type_rejected() {
    let (server, _dir) = create_test_app().await;

    let response = server
        .post("/upload")
        .multipart(files_form([("setup.exe", "application/x-msdownload", b"MZ".to_vec())]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("application/x-msdownload"), "{}", body.error);
}

#[tokio::test]
#[test_log::test]
async fn test_part_without_filename_rejected() {
    let (server, _dir) = create_test_app().await;

    let form = MultipartForm::new().add_part("files", axum_test::multipart::Part::bytes(b"orphan".to_vec()).mime_type("text/plain"));
    let response = server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "File name cannot be empty");
}

#[tokio::test]
#[test_log::test]
async fn test_empty_file_follows_config() {
    let (server, _dir) = create_test_app().await;
    let response = server
        .post("/upload")
        .multipart(files_form([("empty.txt", "text/plain", Vec::new())]))
        .await;
    response.assert_status_ok();

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.uploads.allow_empty_files = false;
    let strict = create_test_server(config).await;
    let response = strict
        .post("/upload")
        .multipart(files_form([("empty.txt", "text/plain", Vec::new())]))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[test_log::test]
async fn test_upload_then_download_round_trip() {
    let (server, _dir) = create_test_app().await;
    let content = b"line one\nline two\n".to_vec();

    let response = server
        .post("/upload")
        .multipart(files_form([("notes.txt", "text/plain", content.clone())]))
        .await;
    response.assert_status_ok();
    let uploaded: UploadResponse = response.json();
    let name = &uploaded.files[0].assigned_name;

    let response = server.get(&format!("/files/{name}")).await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), content.as_slice());
    let disposition = response.header(header::CONTENT_DISPOSITION);
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains(name.as_str()));
    assert_eq!(response.header(header::CONTENT_TYPE), "text/plain");
    assert_eq!(response.header(header::CONTENT_LENGTH), content.len().to_string().as_str());
}

#[tokio::test]
#[test_log::test]
async fn test_api_prefixed_routes() {
    let (server, _dir) = create_test_app().await;

    let response = server.post("/api/upload").multipart(text_files(2)).await;
    response.assert_status_ok();
    let uploaded: UploadResponse = response.json();

    let listing: FileListResponse = server.get("/api/files").await.json();
    let listed: HashSet<_> = listing.files.into_iter().collect();
    for file in &uploaded.files {
        assert!(listed.contains(&file.assigned_name));
        server.get(&format!("/api/files/{}", file.assigned_name)).await.assert_status_ok();
    }
}

#[tokio::test]
#[test_log::test]
async fn test_download_missing_file() {
    let (server, _dir) = create_test_app().await;

    let response = server.get("/files/nonexistent.txt").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "File not found");
}

#[tokio::test]
#[test_log::test]
async fn test_download_traversal_attempts_not_found() {
    let (server, _dir) = create_test_app().await;

    for path in [
        "/files/..%2F..%2Fetc%2Fpasswd",
        "/files/%2E%2E%2F%2E%2E%2Fetc%2Fpasswd",
        "/files/..%2Foutside.txt",
        "/files/..%5C..%5Cwindows%5Cwin.ini",
        "/api/files/..%2F..%2Fetc%2Fpasswd",
    ] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "File not found", "{path}");
    }

    // Unencoded dot segments are normalized away before routing
    server.get("/files/../../etc/passwd").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
#[test_log::test]
async fn test_list_is_stable_without_uploads() {
    let (server, _dir) = create_test_app().await;
    server.post("/upload").multipart(text_files(3)).await.assert_status_ok();

    let first: FileListResponse = server.get("/files").await.json();
    let second: FileListResponse = server.get("/files").await.json();

    let first: HashSet<_> = first.files.into_iter().collect();
    let second: HashSet<_> = second.files.into_iter().collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
#[test_log::test]
async fn test_list_empty_directory() {
    let (server, _dir) = create_test_app().await;
    let listing: FileListResponse = server.get("/files").await.json();
    assert!(listing.files.is_empty());
}

#[tokio::test]
#[test_log::test]
async fn test_upload_dir_created_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("data").join("uploads");
    let server = create_test_server(create_test_config(&upload_dir)).await;
    assert!(upload_dir.is_dir());

    server.post("/upload").multipart(text_files(1)).await.assert_status_ok();
    assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 1);
}

#[tokio::test]
#[test_log::test]
async fn test_concurrent_uploads_do_not_collide() {
    let (server, _dir) = create_test_app().await;
    let server = &server;

    let requests = (0..10).map(|_| async move {
        let response = server
            .post("/upload")
            .multipart(files_form([("same.txt", "text/plain", b"same".to_vec())]))
            .await;
        response.assert_status_ok();
        response.json::<UploadResponse>().files
    });
    let uploaded: Vec<UploadedFile> = futures::future::join_all(requests).await.into_iter().flatten().collect();

    let names: HashSet<_> = uploaded.iter().map(|f| f.assigned_name.clone()).collect();
    assert_eq!(names.len(), 10);
    let listing: FileListResponse = server.get("/files").await.json();
    assert_eq!(listing.files.len(), 10);
}

#[tokio::test]
#[test_log::test]
async fn test_health() {
    let (server, _dir) = create_test_app().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
    response.assert_json(&serde_json::json!({ "status": "UP" }));
}

#[tokio::test]
#[test_log::test]
async fn test_unknown_route_is_json_404() {
    let (server, _dir) = create_test_app().await;

    let response = server.get("/does/not/exist").await;

    response.assert_status(StatusCode::NOT_FOUND);
    response.assert_json(&serde_json::json!({ "error": "Not found" }));
}

#[tokio::test]
#[test_log::test]
async fn test_openapi_document_served() {
    let (server, _dir) = create_test_app().await;

    let response = server.get("/api-docs/openapi.json").await;

    response.assert_status_ok();
    let doc: serde_json::Value = response.json();
    assert!(doc["paths"].get("/upload").is_some());
}
