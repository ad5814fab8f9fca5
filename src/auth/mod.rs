//! API-key authentication.
//!
//! Keys look like `sk_test_<48 hex chars>`. Only the SHA-256 hash of a
//! key is ever persisted; the raw key is shown once at provisioning time
//! and compared by hash on every request.

pub mod middleware;
pub mod repository;

pub use middleware::{AuthedMerchant, api_key_auth};
pub use repository::{ApiKey, ApiKeyRepository};

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of the stored key prefix, enough to identify a key in logs
/// without revealing it (`sk_test_` plus six hex chars).
const PREFIX_LEN: usize = 14;

/// Hex-encoded SHA-256 of a raw API key.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh raw API key and its loggable prefix.
pub fn generate_api_key() -> (String, String) {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw_key = format!("sk_test_{}", hex::encode(bytes));
    let prefix = raw_key[..PREFIX_LEN].to_string();
    (raw_key, prefix)
}
