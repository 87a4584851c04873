//! Access token map plus in-flight refresh map
//!
//! Both maps sit behind one tokio `Mutex`, so "look up entry, else join or
//! register a refresh" is a single critical section. The lock is never held
//! across the refresh itself: the refresh runs as a `Shared` future that any
//! number of callers can await, and the future records its own outcome when
//! it settles, so the result lands in the cache even if the caller that
//! started it has gone away.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::unix_now;

use crate::entry::{AccessTokenEntry, AccessTokenKey};

type InFlight<E> = Shared<BoxFuture<'static, Result<String, E>>>;

struct CacheState<E> {
    entries: HashMap<AccessTokenKey, AccessTokenEntry>,
    in_flight: HashMap<AccessTokenKey, InFlight<E>>,
    /// Bumped by `clear()`; refreshes started under an older generation
    /// don't write their result back.
    generation: u64,
}

impl<E> CacheState<E> {
    /// Unexpired token for `key`; an expired entry is evicted on the way.
    fn fresh(&mut self, key: &AccessTokenKey, now: i64) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Some(entry.token.clone()),
            Some(_) => {
                debug!(key = %key, "evicting expired access token");
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Process-local access token cache with per-key single-flight refresh.
///
/// `E` is the refresh error type; it must be `Clone` because every caller
/// joined to a refresh receives its own copy of the outcome.
pub struct AccessTokenCache<E> {
    state: Arc<Mutex<CacheState<E>>>,
}

impl<E> Default for AccessTokenCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> AccessTokenCache<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                generation: 0,
            })),
        }
    }

    /// Cached token for `key` if it hasn't expired. Expired entries are evicted.
    pub async fn get(&self, key: &AccessTokenKey) -> Option<String> {
        self.state.lock().await.fresh(key, unix_now())
    }

    /// Store (or replace) an entry.
    pub async fn insert(&self, key: AccessTokenKey, entry: AccessTokenEntry) {
        self.state.lock().await.entries.insert(key, entry);
    }

    /// Drop every entry and detach in-flight refreshes from the cache.
    ///
    /// Callers already awaiting a refresh still get its result; it just
    /// isn't stored.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.in_flight.clear();
        state.generation += 1;
        info!("access token cache cleared");
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of refreshes currently registered.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

impl<E> AccessTokenCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Return a valid token for `key`, refreshing at most once per key.
    ///
    /// `refresh` is only invoked when there is neither an unexpired entry nor
    /// a refresh already in flight for this key. On failure the in-flight
    /// marker is removed and no entry is written, so the next call retries.
    pub async fn get_or_refresh<F, Fut>(&self, key: AccessTokenKey, refresh: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessTokenEntry, E>> + Send + 'static,
    {
        let pending = {
            let mut state = self.state.lock().await;

            if let Some(token) = state.fresh(&key, unix_now()) {
                metrics::counter!("logto_access_token_cache_hits_total").increment(1);
                return Ok(token);
            }

            match state.in_flight.get(&key) {
                Some(pending) => {
                    debug!(key = %key, "joining in-flight refresh");
                    metrics::counter!("logto_access_token_refresh_joined_total").increment(1);
                    pending.clone()
                }
                None => {
                    debug!(key = %key, "starting access token refresh");
                    let pending = self.settle(key.clone(), state.generation, refresh());
                    state.in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Wrap a refresh so that, once it settles, it clears its in-flight
    /// marker and stores a successful result.
    fn settle<Fut>(&self, key: AccessTokenKey, generation: u64, refresh: Fut) -> InFlight<E>
    where
        Fut: Future<Output = Result<AccessTokenEntry, E>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        async move {
            let outcome = refresh.await;
            let mut state = state.lock().await;
            let current = state.generation == generation;
            if current {
                state.in_flight.remove(&key);
            }

            match outcome {
                Ok(entry) => {
                    metrics::counter!("logto_access_token_refresh_total", "outcome" => "success")
                        .increment(1);
                    let token = entry.token.clone();
                    if current {
                        state.entries.insert(key, entry);
                    } else {
                        debug!(key = %key, "cache cleared during refresh, result not stored");
                    }
                    Ok(token)
                }
                Err(e) => {
                    metrics::counter!("logto_access_token_refresh_total", "outcome" => "failure")
                        .increment(1);
                    warn!(key = %key, "access token refresh failed");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}
