//! Revoked-token bookkeeping.
//!
//! A revocation is a marker stored under a hash of the token with a ttl equal
//! to the token's remaining lifetime, so an entry can never outlive the token
//! it invalidates. Backends only need `set` with expiry and `get`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const REVOKED_MARKER: &str = "logout";
const KEY_PREFIX: &str = "revoked:";

#[derive(Debug, Clone, Error)]
pub enum RevocationError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn set(&self, key: &str, marker: &str, ttl_secs: u64) -> Result<(), RevocationError>;
    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError>;
}

/// Revocation checks and writes on top of a pluggable store.
#[derive(Clone)]
pub struct Revocations {
    store: Arc<dyn RevocationStore>,
}

impl Revocations {
    pub fn new(store: Arc<dyn RevocationStore>) -> Self {
        Self { store }
    }

    /// Record `token` as revoked for `ttl_secs`. A zero ttl means the token is
    /// already expired and nothing is written; returns whether an entry was stored.
    pub async fn revoke(&self, token: &str, ttl_secs: u64) -> Result<bool, RevocationError> {
        if ttl_secs == 0 {
            tracing::debug!("skipping revocation of an already expired token");
            return Ok(false);
        }
        self.store
            .set(&revocation_key(token), REVOKED_MARKER, ttl_secs)
            .await?;
        Ok(true)
    }

    pub async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        Ok(self.store.get(&revocation_key(token)).await?.is_some())
    }
}

pub fn revocation_key(token: &str) -> String {
    format!("{KEY_PREFIX}{:x}", Sha256::digest(token.as_bytes()))
}

// ── In-memory backend ───────────────────────────────────────────────────────

#[derive(Clone)]
struct Marker {
    value: String,
    ttl: Duration,
}

struct MarkerExpiry;

impl Expiry<String, Marker> for MarkerExpiry {
    fn expire_after_create(&self, _key: &String, value: &Marker, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Marker,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local store. There is no size bound: an entry only leaves the
/// cache when its ttl passes, which is never before its token expires.
#[derive(Clone)]
pub struct MemoryRevocationStore {
    entries: moka::future::Cache<String, Marker>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self {
            entries: moka::future::Cache::builder()
                .expire_after(MarkerExpiry)
                .build(),
        }
    }
}

impl Default for MemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn set(&self, key: &str, marker: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        self.entries
            .insert(
                key.to_string(),
                Marker {
                    value: marker.to_string(),
                    ttl: Duration::from_secs(ttl_secs),
                },
            )
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError> {
        Ok(self.entries.get(key).await.map(|m| m.value))
    }
}

// ── Redis backend ───────────────────────────────────────────────────────────

/// Shared store so revocations apply across gateway instances.
pub struct RedisRevocationStore {
    conn: ConnectionManager,
}

impl RedisRevocationStore {
    pub async fn connect(url: &str) -> Result<Self, RevocationError> {
        let client =
            redis::Client::open(url).map_err(|e| RevocationError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))?;
        tracing::info!("connected to redis revocation store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn set(&self, key: &str, marker: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, marker, ttl_secs)
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| RevocationError::Unavailable(e.to_string()))
    }
}
