//! Content fingerprints for mounted configuration.
//!
//! The pod template carries a fingerprint of every ConfigMap the pods read.
//! Kubernetes does not restart pods when a mounted ConfigMap changes, but it
//! does roll the Deployment when the template's annotations change.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Lowercase hex SHA-256 over the mapping's entries in key order.
///
/// Keys and values are base64-encoded individually so that the `:`
/// separator can never appear inside an encoded item.
pub fn fingerprint(data: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    // BTreeMap iterates in lexical key order
    for (key, value) in data {
        for item in [key, value] {
            hasher.update(STANDARD.encode(item.as_bytes()));
            hasher.update(b":");
        }
    }
    format!("{:x}", hasher.finalize())
}
