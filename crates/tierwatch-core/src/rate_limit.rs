//! Per-identity request cooldown.
//!
//! One accepted request per `(server, name)` per window. A rejected request
//! does not move the window, and a failing store lets everything through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::traits::RateLimitStore;

pub fn rate_limit_key(server: &str, name: &str) -> String {
    format!("ratelimit:character:{}:{server}:{name}", server.len())
}

/// In-process [`RateLimitStore`].
#[derive(Clone, Default)]
pub struct MemoryRateLimitStore {
    /// Last accepted request and its expiry, per identity key.
    last_request: Arc<Mutex<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn last_request(&self, key: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let map = self.last_request.lock().await;
        let now = Utc::now();
        Ok(map
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(at, _)| *at))
    }

    async fn record_request(
        &self,
        key: &str,
        at: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), AppError> {
        let mut map = self.last_request.lock().await;
        let now = Utc::now();
        map.retain(|_, (_, expires_at)| *expires_at > now);
        let expires_at = at
            .checked_add_signed(to_delta(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        map.insert(key.to_string(), (at, expires_at));
        Ok(())
    }
}

/// Enforces the cooldown on top of a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter<S> {
    store: S,
    window: Duration,
    enabled: bool,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, window: Duration) -> Self {
        Self {
            store,
            window,
            enabled: true,
        }
    }

    pub fn disabled(store: S) -> Self {
        Self {
            store,
            window: Duration::ZERO,
            enabled: false,
        }
    }

    /// Admit or reject a request for `(server, name)`.
    ///
    /// Rejections carry the whole seconds left in the window, rounded up so
    /// a caller waiting that long is always admitted.
    pub async fn check(&self, server: &str, name: &str) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }
        let key = rate_limit_key(server, name);
        let now = Utc::now();
        let window = to_delta(self.window);

        match self.store.last_request(&key).await {
            Ok(Some(last)) => {
                let elapsed = now - last;
                if elapsed < window {
                    let remaining = window - elapsed;
                    let secs = remaining.num_seconds() as u64
                        + u64::from(remaining.subsec_nanos() > 0);
                    tracing::debug!(%server, %name, retry_after_secs = secs, "Rate limited");
                    return Err(AppError::RateLimited {
                        retry_after_secs: secs.max(1),
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%server, %name, error = %e, "Rate-limit store unavailable, allowing request");
                return Ok(());
            }
        }

        if let Err(e) = self.store.record_request(&key, now, self.window).await {
            tracing::warn!(%server, %name, error = %e, "Failed to record request");
        }
        Ok(())
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}
