//! Blob Storage - Key Derivation and Object I/O
//!
//! Keys are flat paths such as `input/20260101120000_<uuid>.jpg`; public URLs
//! are `{base}/{key}`. No caching and no retries at this layer.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::codec::sniff_mime_type;
use crate::config::Settings;
use crate::hashing::sha256_hex;

/// Declared when neither the store nor the bytes tell us better.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage URL: {0:?}")]
    InvalidUrl(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Storage backend returned {status} for {key}: {message}")]
    Backend {
        key: String,
        status: u16,
        message: String,
    },

    #[error("Storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Encoded image bytes plus their declared MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Raw object as returned by the backend
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Key-addressable object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError>;

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Derive a storage key from a fully-qualified blob URL.
pub fn resolve_key(url: &str) -> Result<String, StorageError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidUrl(url.to_string()));
    }

    let parsed = Url::parse(trimmed).map_err(|_| StorageError::InvalidUrl(url.to_string()))?;
    let key = parsed.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(StorageError::InvalidUrl(url.to_string()));
    }

    Ok(key.to_string())
}

/// Fresh, collision-resistant key: `{prefix}/{timestamp}_{uuid}.{ext}`
pub fn fresh_key(prefix: &str, extension: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let name = format!(
        "{}_{}.{}",
        timestamp,
        Uuid::new_v4(),
        extension.trim_start_matches('.')
    );
    match prefix.trim_matches('/') {
        "" => name,
        prefix => format!("{prefix}/{name}"),
    }
}

/// Storage client: URL/key mapping on top of an [`ObjectStore`].
///
/// Cheap to clone; the backend handle is shared.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn ObjectStore>,
    base_url: String,
    base_host: Option<String>,
    base_path: String,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn ObjectStore>, base_url: &str) -> Self {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).ok();
        Self {
            backend,
            base_host: parsed.as_ref().and_then(|u| u.host_str().map(str::to_string)),
            base_path: parsed
                .as_ref()
                .map(|u| u.path().trim_matches('/').to_string())
                .unwrap_or_default(),
            base_url,
        }
    }

    /// HTTP-backed store for the configured base URL. Needs no model
    /// credentials.
    pub fn from_settings(settings: &Settings) -> Result<Self, StorageError> {
        let backend = HttpObjectStore::new(
            &settings.storage_base_url,
            settings.storage_token.clone(),
            settings.storage_timeout,
        )?;
        Ok(Self::new(Arc::new(backend), &settings.storage_base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Like [`resolve_key`], but drops the base URL's own path (path-style
    /// buckets) when the URL points at this store.
    pub fn resolve_key(&self, url: &str) -> Result<String, StorageError> {
        let key = resolve_key(url)?;
        if self.base_path.is_empty() {
            return Ok(key);
        }

        let same_host = Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            == self.base_host;
        match key.strip_prefix(&format!("{}/", self.base_path)) {
            Some(rest) if same_host && !rest.is_empty() => Ok(rest.to_string()),
            _ => Ok(key),
        }
    }

    pub async fn fetch(&self, key: &str) -> Result<ImageBlob, StorageError> {
        let object = self.backend.get_object(key).await?;
        let mime_type = declared_mime_type(object.content_type.as_deref(), &object.bytes);
        debug!(key, size = object.bytes.len(), mime_type = %mime_type, "fetched blob");
        Ok(ImageBlob::new(object.bytes, mime_type))
    }

    /// Upload under a freshly generated key and return its public URL.
    pub async fn store(
        &self,
        prefix: &str,
        extension: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = fresh_key(prefix, extension);
        debug!(key = %key, size = bytes.len(), content_type, "storing blob");
        self.backend.put_object(&key, bytes, content_type).await?;
        Ok(self.url_for(&key))
    }
}

/// The store's content type if it names an image, else whatever the bytes
/// look like, else JPEG.
fn declared_mime_type(content_type: Option<&str>, bytes: &[u8]) -> String {
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .filter(|ct| ct.starts_with("image/"));

    match declared {
        Some(ct) => ct.to_string(),
        None => sniff_mime_type(bytes).unwrap_or(FALLBACK_MIME_TYPE).to_string(),
    }
}

/// Object store reached over plain HTTP GET/PUT at `{base}/{key}`
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .authorize(self.http.get(self.object_url(key)))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Backend {
                key: key.to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(StoredObject { bytes, content_type })
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let digest = sha256_hex(&bytes);
        let response = self
            .authorize(self.http.put(self.object_url(key)))
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-meta-sha256", digest)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Backend {
                key: key.to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
