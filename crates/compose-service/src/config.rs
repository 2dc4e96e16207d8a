//! Configuration management for the compose service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where compose jobs are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("Unknown store backend: {}", other),
        }
    }
}

/// Which pipeline the workers drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Mock,
    Command,
}

impl FromStr for PipelineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(PipelineKind::Mock),
            "command" => Ok(PipelineKind::Command),
            other => anyhow::bail!("Unknown pipeline: {}", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    pub store: StoreBackend,

    /// Redis connection URL, used with the Redis store
    pub redis_url: String,

    pub pipeline: PipelineKind,

    /// Builder command line for the command pipeline
    pub builder_command: Option<String>,

    /// Working directory root for the command pipeline
    pub work_dir: PathBuf,

    /// Number of compose workers
    pub workers: usize,

    /// Version reported by `GET /version`
    pub version: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            api_host: var("COMPOSER_HOST", "0.0.0.0"),

            api_port: var("COMPOSER_PORT", "8086")
                .parse()
                .context("Invalid COMPOSER_PORT")?,

            store: var("COMPOSER_STORE", "redis")
                .parse()
                .context("Invalid COMPOSER_STORE")?,

            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),

            pipeline: var("COMPOSER_PIPELINE", "mock")
                .parse()
                .context("Invalid COMPOSER_PIPELINE")?,

            builder_command: lookup("COMPOSER_BUILDER_CMD").filter(|cmd| !cmd.trim().is_empty()),

            work_dir: var("COMPOSER_WORK_DIR", "/tmp/composes").into(),

            workers: var("COMPOSER_WORKERS", "1")
                .parse()
                .context("Invalid COMPOSER_WORKERS")?,

            version: var("COMPOSER_VERSION", env!("CARGO_PKG_VERSION")),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("COMPOSER_PORT must be greater than 0");
        }

        if self.workers == 0 {
            anyhow::bail!("COMPOSER_WORKERS must be greater than 0");
        }

        if self.pipeline == PipelineKind::Command && self.builder_command.is_none() {
            anyhow::bail!("COMPOSER_BUILDER_CMD is required for the command pipeline");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
