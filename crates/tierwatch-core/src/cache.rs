//! Short-lived response cache for resolved characters.
//!
//! The cache is an optimisation only: backend failures are logged and
//! treated as a miss (on read) or ignored (on write).

use std::time::{Duration, Instant};

use moka::future::Cache;

use crate::error::AppError;
use crate::models::CharacterRecord;
use crate::traits::CacheBackend;

/// Cache key for a character. Length-prefixing the server keeps the
/// encoding unambiguous even when names contain the separator.
pub fn character_key(server: &str, name: &str) -> String {
    format!("character:{}:{server}:{name}", server.len())
}

#[derive(Clone)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

/// In-process [`CacheBackend`] on top of `moka`.
///
/// moka only supports a cache-wide TTL, so each entry also carries its own
/// deadline and is treated as absent once that passes.
#[derive(Clone)]
pub struct MokaCacheBackend {
    entries: Cache<String, Entry>,
}

impl MokaCacheBackend {
    pub fn new(max_capacity: u64, max_ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(max_ttl)
                .build(),
        }
    }
}

impl CacheBackend for MokaCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self.entries.get(key).await {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.payload)),
            Some(_) => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let entry = Entry {
            payload: value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }
}

/// Typed, failure-tolerant view over a [`CacheBackend`].
#[derive(Clone)]
pub struct ResponseCache<B> {
    backend: B,
    ttl: Duration,
    enabled: bool,
}

impl<B: CacheBackend> ResponseCache<B> {
    pub fn new(backend: B, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            enabled: true,
        }
    }

    pub fn disabled(backend: B) -> Self {
        Self {
            backend,
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub async fn get(&self, server: &str, name: &str) -> Option<CharacterRecord> {
        if !self.enabled {
            return None;
        }
        let key = character_key(server, name);
        let payload = match self.backend.get(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%server, %name, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&payload) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(%server, %name, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set(&self, record: &CharacterRecord) {
        if !self.enabled {
            return;
        }
        let key = character_key(&record.server, &record.name);
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.backend.set(&key, payload, self.ttl).await {
            tracing::warn!(server = %record.server, name = %record.name, error = %e, "Cache write failed");
        }
    }
}
