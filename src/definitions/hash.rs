//! Canonical JSON and definitions fingerprints.
//!
//! Canonical JSON sorts object keys recursively, so two structurally equal
//! values always render to the same string regardless of how their maps were
//! built. Fingerprints are SHA-256 digests of that rendering.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::types::{Definitions, ResourceKind};

/// Renders a JSON value with object keys sorted at every level.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hasher for computing definitions fingerprints.
#[derive(Debug, Default)]
pub struct DefinitionsHasher;

impl DefinitionsHasher {
    /// Creates a new definitions hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of a whole definitions snapshot.
    ///
    /// Record order within a section is significant; key order within a
    /// record is not.
    #[must_use]
    pub fn hash(&self, definitions: &Definitions) -> String {
        let mut hasher = Sha256::new();

        for kind in ResourceKind::ALL {
            hasher.update(kind.section().as_bytes());
            for record in definitions.get(kind) {
                hasher.update(canonical_json(record).as_bytes());
                hasher.update(b"\n");
            }
        }

        hex::encode(hasher.finalize())
    }
}
