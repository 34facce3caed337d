//! # filegate: File Ingestion Gateway
//!
//! `filegate` accepts multipart file uploads over HTTP, validates them against a configurable
//! policy, persists them under collision-resistant names and serves them back. It can optionally
//! run in front of a downstream storage service ("proxy mode"), forwarding accepted uploads and
//! relaying listings and downloads.
//!
//! ## Request Flow
//!
//! An upload (`POST /upload` or `POST /api/upload`) goes through:
//!
//! 1. **Intake** ([`uploads::intake`]): the multipart body is read part by part. Only `files` parts
//!    are kept; part count and per-file bytes are checked as they stream in.
//! 2. **Validation** ([`uploads::UploadPolicy`]): the whole batch is screened (count, then type,
//!    size and emptiness per file). One violation rejects the entire request before any write.
//! 3. **Storage** ([`storage::FileStorage`]): each file gets an assigned name
//!    (`<epoch millis>-<random>-<sanitized original>`) and is written atomically.
//! 4. **Proxy** ([`downstream::Downstream`], proxy mode only): the original bytes are re-posted to
//!    the downstream service and its acknowledgment is merged into the response. A downstream
//!    failure does not roll back the local files.
//!
//! Listing (`GET /files`) and download (`GET /files/{filename}`) skip validation and read the
//! local storage directory, or relay the downstream service in proxy mode.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use filegate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = filegate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     filegate::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod downstream;
pub mod errors;
pub mod openapi;
pub mod storage;
pub mod telemetry;
pub mod uploads;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::downstream::{Downstream, DownstreamReqwest};
use crate::openapi::ApiDoc;
use crate::storage::{FileStorage, LocalFileStorage};
use crate::uploads::UploadPolicy;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Json, Router, http,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .policy(Arc::new(policy))
///     .storage(Arc::new(LocalFileStorage::new(dir)))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub policy: Arc<UploadPolicy>,
    pub storage: Arc<dyn FileStorage>,
    /// Present in proxy mode
    pub downstream: Option<Arc<dyn Downstream>>,
}

impl AppState {
    /// Wire up the policy, storage backend and optional downstream client from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let policy = UploadPolicy::from_config(&config.uploads);
        let storage = LocalFileStorage::new(config.storage.upload_dir.clone());
        let downstream = match &config.downstream {
            Some(downstream) => {
                info!(url = %downstream.url, timeout = ?downstream.timeout, "Proxy mode enabled");
                Some(Arc::new(DownstreamReqwest::new(downstream)?) as Arc<dyn Downstream>)
            }
            None => None,
        };

        Ok(Self::builder()
            .config(config)
            .policy(Arc::new(policy))
            .storage(Arc::new(storage))
            .maybe_downstream(downstream)
            .build())
    }
}

/// Install the process-wide rustls crypto provider used by the downstream client.
///
/// Safe to call more than once; only the first call has an effect.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    // tower-http refuses `*` inside an origin list
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .expose_headers([http::header::CONTENT_DISPOSITION, http::header::CONTENT_LENGTH]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Upload, listing and download routes. Mounted both at the root and under `/api`.
fn file_routes(policy: &UploadPolicy) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(api::handlers::files::upload_files).layer(DefaultBodyLimit::max(policy.request_body_limit())),
        )
        .route("/files", get(api::handlers::files::list_files))
        .route("/files/{filename}", get(api::handlers::files::download_file))
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let files = file_routes(&state.policy);
    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/health", get(api::handlers::health::health))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(files.clone())
        .nest("/api", files)
        .fallback(api::handlers::not_found)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The HTTP server: [`Application::new`] prepares storage and the router, [`Application::serve`]
/// binds and runs until the shutdown future resolves.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting file gateway with configuration: {:#?}", config);

        let state = AppState::from_config(config.clone())?;
        // Fail fast on an unusable upload directory rather than on the first request
        state.storage.ensure_root().await?;

        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            upload_dir = %self.config.storage.upload_dir.display(),
            proxy_mode = self.config.is_proxy_mode(),
            "File gateway listening on http://{}",
            bind_addr
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
