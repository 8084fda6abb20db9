//! API Routes

pub mod api_keys;
pub mod cache;
pub mod health;
pub mod usage;
