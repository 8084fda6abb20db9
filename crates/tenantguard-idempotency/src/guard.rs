//! Idempotency Guard
//!
//! Per `(key, tenant)`:
//!
//! 1. take the per-process advisory lock
//! 2. look up an unexpired record; replay it if the fingerprint matches
//! 3. otherwise run the handler and persist a 2xx response insert-if-absent
//!
//! The lock closes the lookup → execute window inside one process. Across
//! instances the store's insert-if-absent decides which response is kept.

use crate::key::fingerprint;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tenantguard_common::{Clock, GateError, GateResult, IdempotencyRecord, IdempotencyStore, SharedClock, TenantId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type LockKey = (String, TenantId);
type LockMap = DashMap<LockKey, Arc<Mutex<()>>>;

/// Guard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Lifetime of a stored response
    pub ttl: Duration,
    /// Path prefixes never deduplicated
    pub bypass_paths: Vec<String>,
    pub sweep_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            bypass_paths: vec!["/api/v1/webhooks".into(), "/api/v1/identity/verify".into()],
            sweep_interval: Duration::from_secs(600),
        }
    }
}

/// What to do with a request
#[derive(Debug)]
pub enum Begin {
    /// A stored response exists, send it without running the handler
    Replay(IdempotencyRecord),
    /// First sighting, run the handler then [`IdempotencyPermit::complete`]
    Proceed(IdempotencyPermit),
}

/// Exclusive right to execute a request for `(key, tenant)` in this process
pub struct IdempotencyPermit {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    store: Arc<dyn IdempotencyStore>,
    clock: SharedClock,
    ttl: chrono::Duration,
    key: String,
    tenant_id: TenantId,
    method: String,
    path: String,
    fingerprint: String,
    request_body: Vec<u8>,
}

impl std::fmt::Debug for IdempotencyPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyPermit")
            .field("key", &self.key)
            .field("tenant_id", &self.tenant_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl IdempotencyPermit {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist the handler's response. Only 2xx responses are stored.
    /// Returns the record held by the store afterwards.
    pub async fn complete(
        mut self,
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    ) -> GateResult<Option<IdempotencyRecord>> {
        if !(200..300).contains(&status) {
            debug!(key = %self.key, status, "response not stored");
            return Ok(None);
        }

        let created_at = self.clock.now();
        let record = IdempotencyRecord {
            key: self.key.clone(),
            tenant_id: self.tenant_id.clone(),
            path: std::mem::take(&mut self.path),
            method: std::mem::take(&mut self.method),
            fingerprint: self.fingerprint.clone(),
            request_body: std::mem::take(&mut self.request_body),
            response_status: status,
            response_body: body,
            response_content_type: content_type,
            created_at,
            expires_at: created_at + self.ttl,
        };
        let stored = self.store.insert_if_absent(record).await?;
        if stored.created_at != created_at {
            // Another instance finished first, its response is the one replayed
            info!(key = %self.key, tenant_id = %self.tenant_id, "concurrent duplicate, earlier response kept");
        }
        Ok(Some(stored))
    }
}

impl Drop for IdempotencyPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        let lock_key = (std::mem::take(&mut self.key), self.tenant_id.clone());
        // Only the map itself still references an idle lock
        self.locks.remove_if(&lock_key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Deduplicates mutating requests
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    locks: Arc<LockMap>,
    config: IdempotencyConfig,
    clock: SharedClock,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig, clock: SharedClock) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
            config,
            clock,
        }
    }

    /// Whether a request is subject to deduplication
    pub fn applies(&self, method: &str, path: &str) -> bool {
        if !matches!(method, "POST" | "PUT" | "PATCH") {
            return false;
        }
        !self.config.bypass_paths.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Take the lock for `(key, tenant)` and decide between replay and execution
    pub async fn begin(
        &self,
        tenant_id: &TenantId,
        key: &str,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> GateResult<Begin> {
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .map_err(|e| GateError::Internal(format!("invalid idempotency ttl: {e}")))?;
        let lock_key = (key.to_string(), tenant_id.clone());
        let lock = self.locks.entry(lock_key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let guard = lock.lock_owned().await;

        let fingerprint = fingerprint(method, path, body);
        let permit = IdempotencyPermit {
            guard: Some(guard),
            locks: self.locks.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            ttl,
            key: key.to_string(),
            tenant_id: tenant_id.clone(),
            method: method.to_string(),
            path: path.to_string(),
            fingerprint,
            request_body: body.to_vec(),
        };

        match self.store.find_unexpired(key, tenant_id, self.clock.now()).await? {
            Some(record) if record.fingerprint == permit.fingerprint => {
                debug!(key, tenant_id = %tenant_id, "replaying stored response");
                Ok(Begin::Replay(record))
            }
            Some(_) => {
                warn!(key, tenant_id = %tenant_id, path, "idempotency key reused for a different request");
                Err(GateError::IdempotencyKeyReused)
            }
            None => Ok(Begin::Proceed(permit)),
        }
    }

    /// Delete expired records
    pub async fn sweep_expired(&self) -> GateResult<usize> {
        let removed = self.store.purge_expired(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "swept expired idempotency records");
        }
        Ok(removed)
    }

    /// Sweep on the configured interval until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    warn!(error = %e, "idempotency sweep failed");
                }
            }
        })
    }

    /// Locks currently held or awaited
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }
}

/// Timestamp header value for a replayed record
pub fn original_timestamp(record: &IdempotencyRecord) -> String {
    record.created_at.to_rfc3339()
}
