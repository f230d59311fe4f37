//! Content hashing of a pipeline's `dag` block, used to detect whether a
//! cached run's graph still matches the graph being re-run against.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hashes the canonical JSON serialisation of `value`. Callers pass the
/// `dag` section of a pipeline document, not the whole document, so that
/// changes to unrelated top-level keys (e.g. `variables`) don't invalidate
/// a cached run.
pub fn dag_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&canonicalize(serde_json::to_value(value)?))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recursively sorts object keys so semantically identical documents hash
/// identically regardless of field declaration order.
fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"start_at": "x", "name": "pipeline"});
        let b = json!({"name": "pipeline", "start_at": "x"});
        assert_eq!(dag_hash(&a).unwrap(), dag_hash(&b).unwrap());
    }

    #[test]
    fn differing_content_hashes_differently() {
        let a = json!({"start_at": "x"});
        let b = json!({"start_at": "y"});
        assert_ne!(dag_hash(&a).unwrap(), dag_hash(&b).unwrap());
    }
}
