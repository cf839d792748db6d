//! Runtime settings from the environment.
//!
//! Values come from process environment variables (optionally seeded from a
//! `.env` file). Blank values count as unset.

use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gemini::DEFAULT_API_BASE;

pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to read environment file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage_base_url: String,
    pub storage_token: Option<String>,
    api_key: Option<String>,
    pub api_base: String,
    pub storage_timeout: Duration,
    pub model_timeout: Duration,
    pub styles_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Settings from a dotenv-style file, ignoring the process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path)?.collect::<Result<HashMap<_, _>, _>>()?;
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let storage_base_url = match get("STORAGE_BASE_URL") {
            Some(url) => url,
            None => {
                let bucket =
                    get("S3_BUCKET").ok_or(ConfigError::Missing("STORAGE_BASE_URL or S3_BUCKET"))?;
                let region = get("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
                format!("https://{bucket}.s3.{region}.amazonaws.com")
            }
        };
        let storage_base_url = validate_base_url("STORAGE_BASE_URL", &storage_base_url)?;
        let api_base = validate_base_url(
            "GEMINI_API_BASE",
            &get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )?;

        Ok(Self {
            storage_base_url,
            storage_token: get("STORAGE_TOKEN"),
            api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            api_base,
            storage_timeout: timeout_secs(
                "STORAGE_TIMEOUT_SECS",
                get("STORAGE_TIMEOUT_SECS"),
                DEFAULT_STORAGE_TIMEOUT_SECS,
            )?,
            model_timeout: timeout_secs(
                "MODEL_TIMEOUT_SECS",
                get("MODEL_TIMEOUT_SECS"),
                DEFAULT_MODEL_TIMEOUT_SECS,
            )?,
            styles_file: get("STYLES_FILE").map(PathBuf::from),
        })
    }

    /// The model API key; only commands that call the model need it.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing("GOOGLE_API_KEY"))
    }
}

fn validate_base_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn timeout_secs(name: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let secs = match value {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
