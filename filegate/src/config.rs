//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `FILEGATE_CONFIG`
//! environment variable. A missing file is fine, every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FILEGATE_` override YAML values
//! 3. **Deployment variables** - `PORT`, `UPLOAD_DIR` and `DOWNSTREAM_URL` override `port`,
//!    `storage.upload_dir` and `downstream.url`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FILEGATE_UPLOADS__MAX_FILE_COUNT=10` sets the `uploads.max_file_count` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use filegate::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3000
//! storage:
//!   upload_dir: /var/lib/filegate/uploads
//! uploads:
//!   max_file_size: 10485760
//!   max_file_count: 10
//!   allowed_content_types: [image/png, application/pdf]
//! downstream:
//!   url: http://storage-service:8080
//!   timeout: 10s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FILEGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where uploads are persisted
    pub storage: StorageConfig,
    /// Upload validation limits
    pub uploads: UploadsConfig,
    /// Downstream storage service. When set the gateway runs in proxy mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream: Option<DownstreamConfig>,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding stored files, created on first use
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Upload validation limits, turned into an [`crate::uploads::UploadPolicy`] at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Accepted MIME types, compared case-insensitively without parameters
    pub allowed_content_types: Vec<String>,
    /// Per-file size ceiling in bytes
    pub max_file_size: u64,
    /// Maximum number of files in one upload request
    pub max_file_count: usize,
    /// Accept zero-byte files
    pub allow_empty_files: bool,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "text/plain",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_file_size: 5 * 1024 * 1024,
            max_file_count: 5,
            allow_empty_files: true,
        }
    }
}

/// Downstream storage service connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DownstreamConfig {
    /// Base URL, `/api/...` paths are resolved against it
    pub url: Url,
    /// Timeout for each downstream request
    #[serde(default = "DownstreamConfig::default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl DownstreamConfig {
    fn default_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageConfig::default(),
            uploads: UploadsConfig::default(),
            downstream: None,
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Other(anyhow::anyhow!("Config validation: {}", message.into()))
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.uploads.max_file_size == 0 {
            return Err(invalid("uploads.max_file_size must be greater than 0"));
        }

        if self.uploads.max_file_count == 0 {
            return Err(invalid("uploads.max_file_count must be at least 1"));
        }

        if self.uploads.allowed_content_types.is_empty() {
            return Err(invalid(
                "uploads.allowed_content_types cannot be empty, no upload could ever be accepted",
            ));
        }

        if let Some(bad) = self
            .uploads
            .allowed_content_types
            .iter()
            .find(|t| t.parse::<mime_guess::mime::Mime>().is_err())
        {
            return Err(invalid(format!("uploads.allowed_content_types contains an invalid MIME type '{bad}'")));
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(invalid("storage.upload_dir cannot be empty"));
        }

        if let Some(downstream) = &self.downstream {
            if !matches!(downstream.url.scheme(), "http" | "https") {
                return Err(invalid(format!(
                    "downstream.url must use http or https, got '{}'",
                    downstream.url.scheme()
                )));
            }
            if downstream.timeout.is_zero() {
                return Err(invalid("downstream.timeout must be greater than 0"));
            }
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(invalid("CORS allowed_origins cannot be empty. Add at least one allowed origin."));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // FILEGATE_CONFIG names the file itself, it is not a config field
            .merge(Env::prefixed("FILEGATE_").ignore(&["CONFIG"]).split("__"))
            // Plain deployment variables
            .merge(
                Env::raw()
                    .only(&["PORT", "UPLOAD_DIR", "DOWNSTREAM_URL"])
                    .map(|key| {
                        if key == "UPLOAD_DIR" {
                            "storage.upload_dir".into()
                        } else if key == "DOWNSTREAM_URL" {
                            "downstream.url".into()
                        } else {
                            key.as_str().into()
                        }
                    }),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether uploads, listings and downloads go through a downstream service.
    pub fn is_proxy_mode(&self) -> bool {
        self.downstream.is_some()
    }
}
