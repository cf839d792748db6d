//! Restyle Core - Style-Guided Image Transformation
//!
//! Two stored images and a named style go in; one stored PNG comes out.
//!
//! # Guarantees
//! 1. Unknown styles are rejected before any I/O
//! 2. No output is stored unless generation succeeded
//! 3. No result is returned unless the output was stored
//! 4. Storage keys are never reused
//! 5. Nothing is retried inside the core

pub mod codec;
pub mod config;
pub mod engine;
pub mod gemini;
pub mod hashing;
pub mod pipeline;
pub mod prompt;
pub mod storage;
pub mod styles;

pub use config::{ConfigError, Settings};
pub use engine::{
    Candidate, EngineError, GenerationRequest, GenerationResponse, ImageGenerator, Part,
    RemoteError, TransformEngine, DEFAULT_MODEL_ID, SAMPLING_TEMPERATURE,
};
pub use gemini::GeminiClient;
pub use hashing::{canonical_json, compute_job_hash, sha256_hex};
pub use pipeline::{
    upload_input, ErrorKind, PipelineError, TransformPipeline, TransformRequest, TransformResult,
    INPUT_PREFIX, OUTPUT_PREFIX,
};
pub use prompt::PromptBuilder;
pub use storage::{
    resolve_key, BlobStore, HttpObjectStore, ImageBlob, ObjectStore, StorageError, StoredObject,
};
pub use styles::{CatalogError, StyleCatalog, StyleDefinition};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
