//! Hashing - SHA-256 digests for audit logging
//!
//! Job hashes identify a transform by its inputs; output digests travel with
//! the stored object as metadata.

use serde::Serialize;
use serde_json::{json, to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Serialize to JSON with object keys sorted at every level
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Compute job hash for audit logging
/// job_hash = sha256(canonical_json({ engineVersion, modelId, request, styleKey }))
pub fn compute_job_hash(
    style_key: &str,
    model_id: &str,
    request: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let job = json!({
        "engineVersion": engine_version,
        "modelId": model_id,
        "request": serde_json::to_value(request)?,
        "styleKey": style_key,
    });
    Ok(sha256_hex(canonical_json(&job)?.as_bytes()))
}
