//! Content-addressed embedding cache.
//!
//! Keyed by image fingerprint, bounded by capacity with least-recently-used
//! eviction, entries expire after a TTL. Concurrent requests for the same
//! fingerprint share a single in-flight computation; every waiter gets the
//! leader's result, and failures propagate to all waiters without being
//! stored. A request abandoned mid-computation (timeout, disconnect) leaves
//! the flight in place for the next caller to drive.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use veriface_core::{Embedding, Fingerprint};

type Flight<E> = Shared<BoxFuture<'static, Result<Embedding, Arc<E>>>>;

struct CacheEntry {
    embedding: Embedding,
    stored_at: Instant,
    last_used: u64,
}

struct CacheState<E> {
    entries: HashMap<Fingerprint, CacheEntry>,
    inflight: HashMap<Fingerprint, Flight<E>>,
    /// Monotonic access counter backing the LRU order.
    tick: u64,
}

struct CacheShared<E> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState<E>>,
}

pub struct EmbeddingCache<E> {
    inner: Arc<CacheShared<E>>,
}

impl<E> Clone for EmbeddingCache<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Send + Sync + 'static> EmbeddingCache<E> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheShared {
                capacity,
                ttl,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    inflight: HashMap::new(),
                    tick: 0,
                }),
            }),
        }
    }

    /// Returns the cached embedding for `fingerprint`, or runs `compute` to
    /// produce it.
    ///
    /// An expired entry counts as a miss. If another caller is already
    /// computing this fingerprint the new caller awaits that flight instead
    /// of starting its own; only a successful result is stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> Result<Embedding, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Embedding, E>> + Send + 'static,
    {
        let flight = {
            let mut state = self.inner.state.lock();
            state.tick += 1;
            let tick = state.tick;

            if let Some(entry) = state.entries.get_mut(&fingerprint) {
                if entry.stored_at.elapsed() < self.inner.ttl {
                    entry.last_used = tick;
                    return Ok(entry.embedding.clone());
                }
                state.entries.remove(&fingerprint);
            }

            match state.inflight.get(&fingerprint) {
                Some(flight) => flight.clone(),
                None => {
                    let flight =
                        spawn_flight(Arc::downgrade(&self.inner), fingerprint, compute());
                    state.inflight.insert(fingerprint, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Whether a live (non-expired) entry exists for `fingerprint`.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        let state = self.inner.state.lock();
        state
            .entries
            .get(fingerprint)
            .is_some_and(|entry| entry.stored_at.elapsed() < self.inner.ttl)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps `compute` so that completion unregisters the flight and stores a
/// successful result. Holds only a weak reference back to the cache, so a
/// dropped cache does not keep flights alive.
fn spawn_flight<E, Fut>(
    cache: Weak<CacheShared<E>>,
    fingerprint: Fingerprint,
    compute: Fut,
) -> Flight<E>
where
    E: Send + Sync + 'static,
    Fut: Future<Output = Result<Embedding, E>> + Send + 'static,
{
    async move {
        let result = compute.await.map_err(Arc::new);
        if let Some(cache) = cache.upgrade() {
            let mut state = cache.state.lock();
            state.inflight.remove(&fingerprint);
            if let Ok(embedding) = &result {
                store(&cache, &mut state, fingerprint, embedding.clone());
            }
        }
        result
    }
    .boxed()
    .shared()
}

fn store<E>(
    cache: &CacheShared<E>,
    state: &mut CacheState<E>,
    fingerprint: Fingerprint,
    embedding: Embedding,
) {
    if cache.capacity == 0 {
        return;
    }
    if !state.entries.contains_key(&fingerprint) && state.entries.len() >= cache.capacity {
        // Prefer dropping an already-expired entry over a live one.
        let victim = state
            .entries
            .iter()
            .find(|(_, entry)| entry.stored_at.elapsed() >= cache.ttl)
            .map(|(key, _)| *key)
            .or_else(|| {
                state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| *key)
            });
        if let Some(victim) = victim {
            state.entries.remove(&victim);
        }
    }
    let tick = state.tick;
    state.entries.insert(
        fingerprint,
        CacheEntry {
            embedding,
            stored_at: Instant::now(),
            last_used: tick,
        },
    );
}
