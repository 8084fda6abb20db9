//! API Key Authentication
//!
//! Bearer keys of the form `nxk_live_…`, `nxk_test_…` or `nxk_sbx_…`:
//!
//! ```text
//! Authorization: Bearer nxk_live_3fQ9…
//!        │
//!        ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   FORMAT     │──▶│ PREFIX SHARD │──▶│  ARGON2ID    │──▶│   EXPIRY     │
//! │ env + ≥32 ch │   │ first 16 ch  │   │  first match │   │              │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │
//!                       ┌─────────────────────────────────────────▼──┐
//!                       │  HOURLY LIMITER  (key_id, hour) → count    │
//!                       └─────────────────────────────────────────┬──┘
//!                                                                 │
//!                    last_used_at + audit row (detached tasks) ◀──┘
//! ```
//!
//! Scope checks and test-mode blocking are separate per-route gates in
//! [`scopes`].

#![warn(clippy::all)]

pub mod authenticator;
pub mod format;
pub mod hash;
pub mod ratelimit;
pub mod scopes;

pub use authenticator::{ApiKeyAuthenticator, AuthenticatedKey, IssueKeyRequest, IssuedKey, KeyConfig, KeySummary};
pub use format::{looks_like_api_key, parse_bearer};
pub use hash::{HashConfig, KeyHasher};
pub use ratelimit::{HourlyRateLimiter, RateLimitStatus};
pub use scopes::{block_in_test_mode, has_any_scope, require_scope, ADMIN_SCOPE};
