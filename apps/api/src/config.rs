use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::chat::FallbackPolicy;

/// Application configuration loaded from environment variables.
/// Every variable is optional; defaults give a rule-based chat that can
/// still manage model files in the platform data directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// JSON profile override; the built-in profile otherwise.
    pub profile_path: Option<PathBuf>,
    /// JSON model catalog override; the built-in catalog otherwise.
    pub model_catalog_path: Option<PathBuf>,
    /// `None` when no directory was configured and the platform has no
    /// data directory.
    pub model_dir: Option<PathBuf>,
    /// Base URL of the inference server. Unset disables the model backend.
    pub inference_url: Option<String>,
    pub chat_fallback: FallbackPolicy,
    pub min_model_bytes: Option<u64>,
    /// Download the default model in the background at startup.
    pub prefetch_model: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let min_model_bytes = optional_env("MIN_MODEL_MB")
            .map(|mb| {
                mb.parse::<u64>()
                    .map(|mb| mb * 1024 * 1024)
                    .context("MIN_MODEL_MB must be a whole number of megabytes")
            })
            .transpose()?;

        let chat_fallback = match optional_env("CHAT_FALLBACK") {
            Some(raw) => raw.parse::<FallbackPolicy>().map_err(|e| anyhow!(e))?,
            None => FallbackPolicy::default(),
        };

        Ok(Config {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            profile_path: optional_env("PROFILE_PATH").map(PathBuf::from),
            model_catalog_path: optional_env("MODEL_CATALOG_PATH").map(PathBuf::from),
            model_dir: optional_env("MODEL_DIR")
                .map(PathBuf::from)
                .or_else(default_model_dir),
            inference_url: optional_env("INFERENCE_URL"),
            chat_fallback,
            min_model_bytes,
            prefetch_model: optional_env("PREFETCH_MODEL")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }
}

/// `<data dir>/models` for this application.
fn default_model_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "neo", "neo").map(|dirs| dirs.data_dir().join("models"))
}

/// Unset and blank are the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
