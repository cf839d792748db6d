//! Transform Pipeline - Single Entry Point
//!
//! Nothing is written to storage unless generation succeeded, and no result
//! is returned unless the output was stored. No step is retried here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{encode_png, sniff_mime_type, PNG_MIME_TYPE};
use crate::config::{ConfigError, Settings};
use crate::engine::{EngineError, RemoteError, TransformEngine};
use crate::gemini::GeminiClient;
use crate::hashing::{compute_job_hash, sha256_hex};
use crate::prompt::PromptBuilder;
use crate::storage::{BlobStore, StorageError};
use crate::styles::StyleCatalog;
use crate::ENGINE_VERSION;

pub const INPUT_PREFIX: &str = "input";
pub const OUTPUT_PREFIX: &str = "output";

/// Extension given to uploads whose filename has none.
const DEFAULT_UPLOAD_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid style: {0}")]
    InvalidStyle(String),

    #[error("Invalid storage URL: {0:?}")]
    InvalidUrl(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Generation failed (model returned no image): {0}")]
    NoImageProduced(String),

    #[error("Remote model error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Server configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidStyle,
    InvalidUrl,
    InvalidUpload,
    BlobNotFound,
    StorageError,
    NoImageProduced,
    RemoteError,
    ConfigurationError,
    InternalError,
}

impl ErrorKind {
    /// HTTP-style status for the boundary layer
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidStyle | Self::InvalidUrl | Self::InvalidUpload => 400,
            Self::BlobNotFound => 404,
            Self::StorageError | Self::RemoteError => 502,
            Self::NoImageProduced | Self::ConfigurationError | Self::InternalError => 500,
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidStyle(_) => ErrorKind::InvalidStyle,
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::InvalidUpload(_) => ErrorKind::InvalidUpload,
            Self::BlobNotFound(_) => ErrorKind::BlobNotFound,
            Self::Storage(_) => ErrorKind::StorageError,
            Self::NoImageProduced(_) => ErrorKind::NoImageProduced,
            Self::Remote(_) => ErrorKind::RemoteError,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Serialization(_) => ErrorKind::InternalError,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidUrl(url) => Self::InvalidUrl(url),
            StorageError::NotFound(key) => Self::BlobNotFound(key),
            other => Self::Storage(other),
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoImageProduced(reason) => Self::NoImageProduced(reason),
            EngineError::Remote(remote) => Self::Remote(remote),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(alias = "subject_url")]
    pub subject_url: String,
    #[serde(alias = "background_url")]
    pub background_url: String,
    /// Display name or internal key
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub input_url: String,
    pub output_url: String,
    pub style: String,
    pub background_url: String,
}

/// The transform pipeline - single entry point for all restyle operations
pub struct TransformPipeline {
    catalog: Arc<StyleCatalog>,
    store: BlobStore,
    engine: TransformEngine,
}

impl TransformPipeline {
    pub fn new(catalog: Arc<StyleCatalog>, store: BlobStore, engine: TransformEngine) -> Self {
        Self { catalog, store, engine }
    }

    /// Wire the HTTP object store and the Gemini client from settings.
    ///
    /// Fails with a configuration error when the model API key is missing.
    pub fn from_settings(
        settings: &Settings,
        catalog: Arc<StyleCatalog>,
    ) -> Result<Self, PipelineError> {
        let api_key = settings.api_key()?.to_string();
        let generator = GeminiClient::new(api_key, &settings.api_base, settings.model_timeout)?;

        Ok(Self::new(
            catalog,
            BlobStore::from_settings(settings)?,
            TransformEngine::new(Arc::new(generator)),
        ))
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    /// (display name, key) pairs for style listings
    pub fn styles(&self) -> Vec<(&str, &str)> {
        self.catalog.options()
    }

    /// Restyle the subject image and store the result.
    pub async fn run(&self, request: &TransformRequest) -> Result<TransformResult, PipelineError> {
        let result = self.execute(request).await;
        if let Err(err) = &result {
            warn!(kind = ?err.kind(), style = %request.style, error = %err, "transform failed");
        }
        result
    }

    async fn execute(&self, request: &TransformRequest) -> Result<TransformResult, PipelineError> {
        // Unknown styles are rejected before any I/O.
        let style = self
            .catalog
            .resolve(&request.style)
            .ok_or_else(|| PipelineError::InvalidStyle(request.style.clone()))?;

        let subject_key = self.store.resolve_key(&request.subject_url)?;
        let background_key = self.store.resolve_key(&request.background_url)?;

        let job_hash =
            compute_job_hash(&style.key, self.engine.model_id(), request, ENGINE_VERSION)?;
        info!(
            job_hash = %job_hash,
            style_key = %style.key,
            subject_key = %subject_key,
            background_key = %background_key,
            "starting transform"
        );

        let (subject, background) = tokio::try_join!(
            self.store.fetch(&subject_key),
            self.store.fetch(&background_key)
        )?;
        debug!(
            subject_bytes = subject.len(),
            background_bytes = background.len(),
            "fetched inputs"
        );

        let prompt = PromptBuilder::build(style);
        let generated = self.engine.transform(subject, background, &prompt).await?;
        debug!(mime_type = %generated.mime_type, size = generated.len(), "model produced image");

        let png = encode_png(&generated.bytes).map_err(|e| {
            PipelineError::NoImageProduced(format!("model output is not a decodable image: {e}"))
        })?;
        let digest = sha256_hex(&png);

        let output_url = self
            .store
            .store(OUTPUT_PREFIX, "png", png, PNG_MIME_TYPE)
            .await?;
        info!(job_hash = %job_hash, output_url = %output_url, output_sha256 = %digest, "transform stored");

        Ok(TransformResult {
            input_url: request.subject_url.clone(),
            output_url,
            style: request.style.clone(),
            background_url: request.background_url.clone(),
        })
    }

    /// Store a caller-supplied source image under the input prefix.
    pub async fn upload_input(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, PipelineError> {
        upload_input(&self.store, filename, bytes, content_type).await
    }
}

/// Store a caller-supplied source image under the input prefix.
///
/// Needs storage only; no model credentials are involved.
pub async fn upload_input(
    store: &BlobStore,
    filename: &str,
    bytes: Vec<u8>,
    content_type: Option<&str>,
) -> Result<String, PipelineError> {
    if filename.trim().is_empty() {
        return Err(PipelineError::InvalidUpload("no selected file".into()));
    }
    if bytes.is_empty() {
        return Err(PipelineError::InvalidUpload(format!("{filename} is empty")));
    }

    let extension = upload_extension(filename);
    let content_type = content_type
        .map(str::to_string)
        .or_else(|| sniff_mime_type(&bytes).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let url = store
        .store(INPUT_PREFIX, &extension, bytes, &content_type)
        .await?;
    info!(url = %url, content_type = %content_type, "uploaded input");
    Ok(url)
}

/// Lower-cased extension of `filename`; anything but ASCII alphanumerics
/// falls back to the default.
fn upload_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_UPLOAD_EXTENSION.to_string(),
    }
}
