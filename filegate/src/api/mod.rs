//! HTTP surface of the gateway.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response bodies
//!
//! Upload, listing and download routes are served both at the root (`/upload`, `/files`,
//! `/files/{filename}`) and under `/api`. `GET /health` reports liveness and the OpenAPI document
//! is available at `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
