//! Time-bounded key set cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::config::AuthConfig;
use crate::error::KeyFetchError;
use crate::jwks::{HttpKeySetProvider, KeySet, KeySetProvider};

#[derive(Debug, Clone)]
struct Snapshot {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    snapshot: Option<Snapshot>,
    /// Completed fetches, successful or not.
    attempts: u64,
    last_attempt: Option<Instant>,
    /// Error of the latest fetch, cleared by the next success.
    last_error: Option<KeyFetchError>,
}

impl State {
    fn fresh(&self, ttl: Duration) -> Option<Arc<KeySet>> {
        self.snapshot
            .as_ref()
            .filter(|snap| snap.fetched_at.elapsed() < ttl)
            .map(|snap| Arc::clone(&snap.keys))
    }
}

/// Caches the key set of an inner provider.
///
/// Refreshes when:
/// - the cache is empty
/// - the snapshot is older than the TTL
/// - a key id is requested but not found (key rotation), at most once per
///   `min_refresh_interval` since the last attempt
///
/// Only one refresh runs at a time. Callers that queued behind a refresh get
/// its outcome, including its error, instead of fetching again. A failed
/// refresh keeps the previous snapshot for the unknown-key path.
#[derive(Debug)]
pub struct CachedKeySetProvider<P = HttpKeySetProvider> {
    inner: P,
    ttl: Duration,
    min_refresh_interval: Duration,
    state: RwLock<State>,
    refresh_guard: Mutex<()>,
}

impl<P: KeySetProvider> CachedKeySetProvider<P> {
    /// Wrap `inner` with a 1 hour TTL.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(30),
            state: RwLock::new(State::default()),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Create with custom TTL. A zero TTL disables caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop the cached snapshot; the next call fetches.
    pub async fn invalidate(&self) {
        self.state.write().await.snapshot = None;
    }

    /// Fetch from the inner provider and record the attempt. Call with the
    /// refresh guard held.
    async fn reload(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let result = self.inner.fetch_keys().await;

        let now = Instant::now();
        let mut state = self.state.write().await;
        state.attempts += 1;
        state.last_attempt = Some(now);
        match &result {
            Ok(keys) => {
                state.snapshot = Some(Snapshot {
                    keys: Arc::clone(keys),
                    fetched_at: now,
                });
                state.last_error = None;
                tracing::debug!(keys = keys.len(), "JWKS cache refreshed");
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                tracing::warn!(error = %err, "JWKS cache refresh failed");
            }
        }
        result
    }
}

impl CachedKeySetProvider<HttpKeySetProvider> {
    /// HTTP provider with the configured TTL and refresh interval.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(HttpKeySetProvider::from_config(config))
            .with_ttl(config.cache_ttl())
            .with_min_refresh_interval(config.min_refresh_interval())
    }
}

#[async_trait]
impl<P: KeySetProvider> KeySetProvider for CachedKeySetProvider<P> {
    async fn fetch_keys(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        if self.ttl.is_zero() {
            return self.inner.fetch_keys().await;
        }

        let seen = {
            let state = self.state.read().await;
            if let Some(keys) = state.fresh(self.ttl) {
                return Ok(keys);
            }
            state.attempts
        };

        let _refresh = self.refresh_guard.lock().await;
        {
            let state = self.state.read().await;
            if let Some(keys) = state.fresh(self.ttl) {
                return Ok(keys);
            }
            // A refresh finished while we waited and failed: share its error.
            if state.attempts != seen {
                if let Some(err) = &state.last_error {
                    return Err(err.clone());
                }
            }
        }
        self.reload().await
    }

    async fn refresh_for_unknown_key(
        &self,
        kid: &str,
    ) -> Result<Option<Arc<KeySet>>, KeyFetchError> {
        if self.ttl.is_zero() {
            // Every fetch already hit the provider.
            return Ok(None);
        }

        let _refresh = self.refresh_guard.lock().await;
        {
            let state = self.state.read().await;
            if let Some(snap) = state.snapshot.as_ref().filter(|s| s.keys.contains(kid)) {
                return Ok(Some(Arc::clone(&snap.keys)));
            }
            if let Some(at) = state.last_attempt {
                if at.elapsed() < self.min_refresh_interval {
                    tracing::debug!(kid, "unknown key id, refresh rate limited");
                    return Ok(None);
                }
            }
        }

        tracing::debug!(kid, "unknown key id, refreshing JWKS");
        self.reload().await.map(Some)
    }
}
