//! Salted key hashing (Argon2id, PHC strings)

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tenantguard_common::{GateError, GateResult};
use tracing::warn;

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Secret prepended to every key before hashing
    pub pepper: Option<String>,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
            pepper: None,
        }
    }
}

/// Hashes and verifies raw keys
#[derive(Clone)]
pub struct KeyHasher {
    argon2: Argon2<'static>,
    pepper: Option<Arc<str>>,
}

impl std::fmt::Debug for KeyHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHasher")
            .field("params", self.argon2.params())
            .field("pepper", &self.pepper.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl KeyHasher {
    pub fn new(config: &HashConfig) -> GateResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| GateError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            pepper: config.pepper.as_deref().map(Arc::from),
        })
    }

    fn input(&self, secret: &str) -> Vec<u8> {
        match &self.pepper {
            Some(pepper) => format!("{pepper}{secret}").into_bytes(),
            None => secret.as_bytes().to_vec(),
        }
    }

    /// Hash a raw key with a fresh salt
    pub fn hash(&self, secret: &str) -> GateResult<String> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| GateError::Internal(format!("salt encoding failed: {e}")))?;
        self.argon2
            .hash_password(&self.input(secret), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| GateError::Internal(format!("hashing failed: {e}")))
    }

    /// Compare a raw key against a stored PHC string.
    ///
    /// A malformed stored hash never matches.
    pub fn verify(&self, secret: &str, stored: &str) -> bool {
        let parsed = match PasswordHash::new(stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "stored key hash is malformed");
                return false;
            }
        };
        self.argon2.verify_password(&self.input(secret), &parsed).is_ok()
    }

    /// [`KeyHasher::hash`] on the blocking pool
    pub async fn hash_async(&self, secret: String) -> GateResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| GateError::Internal(format!("hash task failed: {e}")))?
    }

    /// [`KeyHasher::verify`] on the blocking pool
    pub async fn verify_async(&self, secret: Arc<str>, stored: String) -> GateResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored))
            .await
            .map_err(|e| GateError::Internal(format!("verify task failed: {e}")))
    }
}

#[cfg(test)]
pub(crate) fn test_hasher(pepper: Option<&str>) -> KeyHasher {
    KeyHasher::new(&HashConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
        pepper: pepper.map(String::from),
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies() {
        let hasher = test_hasher(None);
        let hash = hasher.hash("nxk_live_secret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("nxk_live_secret", &hash));
        assert!(!hasher.verify("nxk_live_other", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = test_hasher(None);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_pepper_is_applied() {
        let peppered = test_hasher(Some("pepper!"));
        let plain = test_hasher(None);
        let hash = peppered.hash("key").unwrap();
        assert!(peppered.verify("key", &hash));
        assert!(!plain.verify("key", &hash));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!test_hasher(None).verify("key", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_async_variants() {
        let hasher = test_hasher(None);
        let hash = hasher.hash_async("k".into()).await.unwrap();
        assert!(hasher.verify_async(Arc::from("k"), hash).await.unwrap());
    }
}
