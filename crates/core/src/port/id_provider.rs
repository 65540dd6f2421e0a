// Identifier service (spec §4.1) — deterministic, idempotent derivation.
//
// Kept as a trait (rather than bare free functions) so tests can swap in a
// fixed provider, matching the context-struct injection style the rest of
// the ports use — even though the production implementation has no
// randomness to hide.

use sha2::{Digest, Sha256};

/// URL-safe task-index alphabet (spec §4.1: "[A-Za-z0-9-] only").
const INDEX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub trait IdProvider: Send + Sync {
    /// `job_id = hex(SHA256(job_type || canonical_json(parameters)))`.
    fn derive_job_id(&self, job_type: &str, parameters: &serde_json::Value) -> String;

    /// `task_id = {job_id[:16]}-s{stage}-{index_token}`.
    fn derive_task_id(&self, job_id: &str, stage: i32, task_index: i32) -> String;

    /// `request_id = SHA256(dataset_id + resource_id + version_id)`.
    fn derive_request_id(&self, dataset_id: &str, resource_id: &str, version_id: &str) -> String;
}

/// Production identifier provider (spec §4.1).
pub struct Sha256IdProvider;

impl IdProvider for Sha256IdProvider {
    fn derive_job_id(&self, job_type: &str, parameters: &serde_json::Value) -> String {
        let canonical = canonicalize(parameters);
        let mut hasher = Sha256::new();
        hasher.update(job_type.as_bytes());
        hasher.update(canonical.as_bytes());
        hex_encode(&hasher.finalize())
    }

    fn derive_task_id(&self, job_id: &str, stage: i32, task_index: i32) -> String {
        let prefix_len = job_id.len().min(16);
        let prefix = &job_id[..prefix_len];
        format!("{}-s{}-{}", prefix, stage, encode_index_token(task_index))
    }

    fn derive_request_id(&self, dataset_id: &str, resource_id: &str, version_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(dataset_id.as_bytes());
        hasher.update(resource_id.as_bytes());
        hasher.update(version_id.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Renders a non-negative index in the URL-safe base-36 alphabet. Purely a
/// tie-break token (spec §4.1): "no numeric ordering is guaranteed".
fn encode_index_token(index: i32) -> String {
    if index == 0 {
        return "0".to_string();
    }
    let mut n = index.unsigned_abs() as u64;
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(INDEX_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ASCII")
}

/// Sorts object keys recursively and renders a stable textual form so that
/// logically-equal JSON values hash identically regardless of key order
/// (spec §4.1).
fn canonicalize(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", canonicalize(&Value::String(k.clone())), canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        Value::String(s) => format!("\"{}\"", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_stable_under_key_reordering() {
        let provider = Sha256IdProvider;
        let a = serde_json::json!({"b": 2, "a": 1});
        let b = serde_json::json!({"a": 1, "b": 2});
        assert_eq!(
            provider.derive_job_id("ingest_vector", &a),
            provider.derive_job_id("ingest_vector", &b)
        );
    }

    #[test]
    fn job_id_differs_on_job_type() {
        let provider = Sha256IdProvider;
        let params = serde_json::json!({"a": 1});
        assert_ne!(
            provider.derive_job_id("ingest_vector", &params),
            provider.derive_job_id("convert_raster", &params)
        );
    }

    #[test]
    fn task_id_is_url_safe_and_stable() {
        let provider = Sha256IdProvider;
        let job_id = provider.derive_job_id("ingest_vector", &serde_json::json!({}));
        let task_id = provider.derive_task_id(&job_id, 2, 41);
        assert!(task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
        assert_eq!(task_id, provider.derive_task_id(&job_id, 2, 41));
    }
}
