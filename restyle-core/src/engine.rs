//! Transform Engine - Remote Model Invocation
//!
//! A model that completes without an image is reported as
//! [`EngineError::NoImageProduced`], separately from transport failures.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::storage::ImageBlob;

/// Pinned image model.
pub const DEFAULT_MODEL_ID: &str = "gemini-3-pro-image-preview";

pub const SAMPLING_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote model returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed remote model response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No image generated by the model: {0}")]
    NoImageProduced(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// One content fragment sent to or returned by the model
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Image(ImageBlob),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub parts: Vec<Part>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub candidates: Vec<Candidate>,
}

/// Remote generative capability: parts + temperature in, candidates out
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, RemoteError>;
}

pub struct TransformEngine {
    generator: Arc<dyn ImageGenerator>,
    model_id: String,
    temperature: f32,
}

impl TransformEngine {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            generator,
            model_id: DEFAULT_MODEL_ID.to_string(),
            temperature: SAMPLING_TEMPERATURE,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Restyle `subject` using `background` as reference.
    ///
    /// Remote errors are returned as-is; nothing is retried.
    pub async fn transform(
        &self,
        subject: ImageBlob,
        background: ImageBlob,
        prompt: &str,
    ) -> Result<ImageBlob, EngineError> {
        let request = GenerationRequest {
            model: self.model_id.clone(),
            parts: vec![
                Part::Image(subject),
                Part::Image(background),
                Part::Text(prompt.to_string()),
            ],
            temperature: self.temperature,
        };

        let response = self.generator.generate(request).await?;
        first_image(response)
    }
}

/// First candidate, first part, or nothing. Later candidates and parts are
/// ignored.
fn first_image(response: GenerationResponse) -> Result<ImageBlob, EngineError> {
    let total = response.candidates.len();
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::NoImageProduced("response contained no candidates".into()))?;
    if total > 1 {
        debug!(ignored = total - 1, "dropping extra candidates");
    }

    let part = candidate.parts.into_iter().next().ok_or_else(|| {
        EngineError::NoImageProduced("first candidate has no content parts".into())
    })?;

    match part {
        Part::Image(blob) if !blob.is_empty() => Ok(blob),
        Part::Image(_) => Err(EngineError::NoImageProduced(
            "first part carries empty inline data".into(),
        )),
        Part::Text(_) => Err(EngineError::NoImageProduced(
            "first part carries no inline image data".into(),
        )),
    }
}
