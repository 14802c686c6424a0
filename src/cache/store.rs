//! TTL cache with single-flight fetches.
//!
//! Each key maps to either a ready entry or an in-flight fetch. The first
//! caller to miss becomes the leader and runs the fetch outside the lock;
//! concurrent callers for the same key subscribe to the leader's outcome
//! instead of fetching again. Failed fetches are broadcast to the waiters and
//! never stored. Expiry is checked lazily on access; a miss also sweeps
//! expired slots when the last sweep is older than [`SWEEP_INTERVAL`], so keys
//! that are never requested again do not stay resident.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::key::CacheKey;
use crate::types::Result;

/// Minimum time between expiry sweeps on the miss path.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// Entries
// =============================================================================

/// A stored value with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, stored_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expired once `now - stored_at >= ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

type Outcome<V> = Option<Result<V>>;

enum Slot<V> {
    Ready(CacheEntry<V>),
    InFlight(watch::Receiver<Outcome<V>>),
}

enum Claim<V> {
    Hit(V),
    Wait(watch::Receiver<Outcome<V>>),
    Lead(watch::Sender<Outcome<V>>),
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live (unexpired) entries.
    pub entries: usize,
    /// Slots held in memory, expired ones awaiting a sweep included.
    pub resident: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined another caller's fetch.
    pub coalesced: u64,
    pub fetch_failures: u64,
    /// Expired entries reclaimed by sweeps.
    pub swept: u64,
    pub hit_rate: f64,
}

// =============================================================================
// Store
// =============================================================================

/// Keyed TTL cache. `V` is cloned out on every hit.
pub struct CacheStore<V> {
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
    /// Only touched while `slots` is locked.
    swept_at: Mutex<Instant>,
    counters: Counters,
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            swept_at: Mutex::new(Instant::now()),
            counters: Counters::default(),
        }
    }
}

fn sweep<V>(slots: &mut HashMap<CacheKey, Slot<V>>, now: Instant) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| match slot {
        Slot::Ready(entry) => !entry.is_expired(now),
        Slot::InFlight(_) => true,
    });
    before - slots.len()
}

impl<V> std::fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `fetch` and store its
    /// success for `ttl`.
    ///
    /// At most one `fetch` runs per key at a time; concurrent callers receive
    /// the same outcome, errors included. If the leading caller is dropped
    /// mid-fetch, a waiting caller takes over.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let tx = loop {
            match self.claim(key) {
                Claim::Hit(value) => return Ok(value),
                Claim::Lead(tx) => break tx,
                Claim::Wait(mut rx) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key = %key, "joining in-flight fetch");
                    let outcome: Outcome<V> = match rx.wait_for(Option::is_some).await {
                        Ok(seen) => (*seen).clone(),
                        Err(_) => None,
                    };
                    match outcome {
                        Some(result) => return result,
                        None => tracing::debug!(key = %key, "in-flight fetch abandoned, retrying"),
                    }
                }
            }
        };

        let guard = FlightGuard {
            store: self,
            key,
            armed: true,
        };
        let outcome = fetch().await;
        self.settle(key, ttl, &outcome);
        guard.disarm();
        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    fn claim(&self, key: &CacheKey) -> Claim<V> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready(entry)) if !entry.is_expired(now) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, "cache hit");
                return Claim::Hit(entry.value.clone());
            }
            Some(Slot::InFlight(rx)) => return Claim::Wait(rx.clone()),
            _ => {}
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "cache miss");

        let mut swept_at = self.swept_at.lock();
        if now.saturating_duration_since(*swept_at) >= SWEEP_INTERVAL {
            *swept_at = now;
            let removed = sweep(&mut slots, now);
            if removed > 0 {
                self.counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
                tracing::debug!(removed, resident = slots.len(), "swept expired entries");
            }
        }
        drop(swept_at);

        let (tx, rx) = watch::channel(None);
        slots.insert(key.clone(), Slot::InFlight(rx));
        Claim::Lead(tx)
    }

    fn settle(&self, key: &CacheKey, ttl: Duration, outcome: &Result<V>) {
        let mut slots = self.slots.lock();
        match outcome {
            Ok(value) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready(CacheEntry::new(value.clone(), Instant::now(), ttl)),
                );
            }
            Err(err) => {
                slots.remove(key);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, error = %err, "fetch failed, not cached");
            }
        }
    }

    fn abandon(&self, key: &CacheKey) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(Slot::InFlight(_))) {
            slots.remove(key);
        }
    }

    /// Peek at a live entry without fetching or touching the counters.
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        match self.slots.lock().get(key) {
            Some(Slot::Ready(entry)) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Drop a stored entry. In-flight fetches are left alone.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(Slot::Ready(_))) {
            slots.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop every stored entry whose key was built for `operation`.
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, slot| matches!(slot, Slot::InFlight(_)) || key.operation() != operation);
        before - slots.len()
    }

    /// Drop every stored entry; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| matches!(slot, Slot::InFlight(_)));
        before - slots.len()
    }

    /// Evict expired entries eagerly; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        *self.swept_at.lock() = now;
        let removed = sweep(&mut slots, now);
        self.counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let (entries, in_flight, resident) = {
            let slots = self.slots.lock();
            let (ready, flying) = slots.values().fold((0, 0), |(ready, flying), slot| match slot {
                Slot::Ready(entry) if !entry.is_expired(now) => (ready + 1, flying),
                Slot::Ready(_) => (ready, flying),
                Slot::InFlight(_) => (ready, flying + 1),
            });
            (ready, flying, slots.len())
        };
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries,
            resident,
            in_flight,
            hits,
            misses,
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            fetch_failures: self.counters.failures.load(Ordering::Relaxed),
            swept: self.counters.swept.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

/// Removes the in-flight marker if the leading future is dropped before it
/// settles, so waiters can retry instead of hanging.
struct FlightGuard<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    store: &'a CacheStore<V>,
    key: &'a CacheKey,
    armed: bool,
}

impl<V> FlightGuard<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<V> Drop for FlightGuard<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(key = %self.key, "fetch cancelled");
            self.store.abandon(self.key);
        }
    }
}
