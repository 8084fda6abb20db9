//! Idempotency for mutating requests
//!
//! POST/PUT/PATCH requests carry an `Idempotency-Key` header or get a key
//! derived from their content. The first 2xx response for a `(key, tenant)`
//! is stored for 24 hours and replayed verbatim to every retry; the handler
//! runs at most once per key.

#![warn(clippy::all)]

pub mod guard;
pub mod key;

pub use guard::{original_timestamp, Begin, IdempotencyConfig, IdempotencyGuard, IdempotencyPermit};
pub use key::{fingerprint, resolve_key, DERIVED_KEY_PREFIX, IDEMPOTENCY_KEY_HEADER};
