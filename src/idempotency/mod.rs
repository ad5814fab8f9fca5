//! Exactly-once request admission keyed by the `Idempotency-Key` header.
//!
//! A key is claimed with an insert-if-absent on the `idempotency_keys`
//! table, so the guard holds across processes without any in-memory lock.
//! Completed outcomes replay; in-flight duplicates are rejected with a
//! conflict; failed outcomes free the key for retry.

pub mod middleware;
pub mod store;

pub use middleware::{body_sha256_hex, extract_idempotency_key, idempotency_middleware};
pub use store::{IdempotencyRecord, IdempotencyStatus, IdempotencyStore};
