//! Gemini `generateContent` client
//!
//! Images travel as base64 `inlineData` parts in both directions.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::engine::{Candidate, GenerationRequest, GenerationResponse, ImageGenerator, Part, RemoteError};
use crate::storage::ImageBlob;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Assumed when an inline part omits its MIME type.
const DEFAULT_INLINE_MIME_TYPE: &str = "image/png";

pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, api_base: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, RemoteError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let body = GenerateContentRequest::from(&request);

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(status = status.as_u16(), size = bytes.len(), "model responded");

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))?;
        parsed.into_generation_response()
    }
}

// --- Wire format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(request: &GenerationRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                Part::Image(blob) => WirePart {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: blob.mime_type.clone(),
                        data: BASE64.encode(&blob.bytes),
                    }),
                },
                Part::Text(text) => WirePart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
            })
            .collect();

        Self {
            contents: vec![WireContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

impl GenerateContentResponse {
    fn into_generation_response(self) -> Result<GenerationResponse, RemoteError> {
        let candidates = self
            .candidates
            .into_iter()
            .map(|candidate| -> Result<Candidate, RemoteError> {
                let parts = candidate
                    .content
                    .unwrap_or_default()
                    .parts
                    .into_iter()
                    .map(WirePart::into_part)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Candidate { parts })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GenerationResponse { candidates })
    }
}

impl WirePart {
    fn into_part(self) -> Result<Part, RemoteError> {
        match self.inline_data {
            Some(inline) => {
                let bytes = BASE64
                    .decode(inline.data.as_bytes())
                    .map_err(|e| RemoteError::Decode(format!("inline image data: {e}")))?;
                let mime_type = if inline.mime_type.is_empty() {
                    DEFAULT_INLINE_MIME_TYPE.to_string()
                } else {
                    inline.mime_type
                };
                Ok(Part::Image(ImageBlob::new(bytes, mime_type)))
            }
            None => Ok(Part::Text(self.text.unwrap_or_default())),
        }
    }
}
