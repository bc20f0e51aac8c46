//! The cache engine: a keyed map of records with expiration semantics,
//! atomic read-modify-write operations, and bounded-capacity eviction.
//!
//! ## Concurrency Model
//!
//! `Cache` is a cheap-to-clone handle over shared state guarded by a single
//! `std::sync::Mutex`. The mutex is the std one, not Tokio's: no operation
//! awaits while holding it and every critical section is small. One lock
//! (rather than shards) is deliberate: each operation must be atomic with
//! respect to every other, and two concurrent `incr` on the same key must
//! net out to some serial ordering.
//!
//! ## Eviction
//!
//! Mutations that can grow the map (`set`, `delete`, `touch`) wake a purge
//! worker through a `Notify` after releasing the lock; the mutating call
//! itself never pays for eviction. The purge pass removes records in
//! insertion order (FIFO) until the configured bound is satisfied. See
//! [`purge`](Cache::purge) and the `purge` module for scheduling.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::cache::memory;
use crate::cache::record::{epoch_ms, Record};
use crate::error::{Error, Result};

/// How many records a size-bounded purge removes between RSS samples.
const EVICTION_CHUNK: usize = 64;

/// Capacity bound for a cache instance.
///
/// A cache is bounded by record count, by process resident memory, or not at
/// all. The bound only promises eventual enforcement: a purge pass runs after
/// the mutation that crossed the limit, not during it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheConfig {
    /// No eviction; records leave only by expiration, delete, or flush.
    #[default]
    Unbounded,
    /// Evict once the record count reaches this limit.
    ByMaxRecords(usize),
    /// Evict once the process RSS reaches this many megabytes.
    ByMaxSizeMb(u64),
}

/// Handle to a shared cache instance.
///
/// Cloning is shallow; all clones see the same records. The handle is `Send`
/// and `Sync` and is shared freely between the server's connection tasks,
/// the purge worker, and embedded callers.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    /// Woken after any mutation that warrants an eviction check.
    purge_wanted: Notify,
    config: CacheConfig,
    started: Instant,
    /// The TCP port the owning server listens on; informational, stats only.
    port: AtomicU16,
}

struct State {
    records: HashMap<String, Record>,
    /// Keys in first-insertion order; the eviction queue. Entries whose key
    /// has since been deleted are skipped (and dropped) when popped.
    insertion: VecDeque<String>,
    /// Every successful store, ever. Never decremented.
    total_items: u64,
}

enum StoreMode {
    Set,
    Add,
    Replace,
}

impl Cache {
    /// Creates an empty cache with the given capacity bound.
    pub fn new(config: CacheConfig) -> Cache {
        Cache {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    records: HashMap::new(),
                    insertion: VecDeque::new(),
                    total_items: 0,
                }),
                purge_wanted: Notify::new(),
                config,
                started: Instant::now(),
                port: AtomicU16::new(0),
            }),
        }
    }

    /// The value for `key`, or `None` when the key is missing or expired.
    ///
    /// A miss does not remove an expired record; reclamation is the purge
    /// pass's job.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.get_record(key).map(|record| record.value)
    }

    /// Like [`get`](Cache::get) but returns the whole record.
    pub fn get_record(&self, key: &str) -> Option<Record> {
        let state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        state
            .records
            .get(key)
            .filter(|record| record.is_valid(now))
            .cloned()
    }

    /// Whether `key` maps to a live (non-expired) record.
    pub fn contains(&self, key: &str) -> bool {
        let state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        state
            .records
            .get(key)
            .map(|record| record.is_valid(now))
            .unwrap_or(false)
    }

    /// Stores a record unconditionally. Always returns `true`.
    pub fn set(&self, key: &str, value: Bytes, expiration_secs: i64, flags: u32) -> bool {
        self.store(key, value, expiration_secs, flags, StoreMode::Set)
    }

    /// Stores only if `key` is absent (or expired). Returns whether it stored.
    pub fn add(&self, key: &str, value: Bytes, expiration_secs: i64, flags: u32) -> bool {
        self.store(key, value, expiration_secs, flags, StoreMode::Add)
    }

    /// Stores only if `key` is present and live. Returns whether it stored.
    pub fn replace(&self, key: &str, value: Bytes, expiration_secs: i64, flags: u32) -> bool {
        self.store(key, value, expiration_secs, flags, StoreMode::Replace)
    }

    fn store(
        &self,
        key: &str,
        value: Bytes,
        expiration_secs: i64,
        flags: u32,
        mode: StoreMode,
    ) -> bool {
        let record = Record::new(value, expiration_secs, flags);
        let mut state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        let live = state
            .records
            .get(key)
            .map(|existing| existing.is_valid(now))
            .unwrap_or(false);

        match mode {
            StoreMode::Add if live => return false,
            StoreMode::Replace if !live => return false,
            _ => {}
        }

        if !state.records.contains_key(key) {
            state.insertion.push_back(key.to_string());
        }
        state.records.insert(key.to_string(), record);
        state.total_items += 1;
        trace!(key, total = state.total_items, "stored record");
        drop(state);

        self.schedule_purge();
        true
    }

    /// Appends `suffix` to an existing value. Flags and expiration are left
    /// untouched. Returns `false` when the key is missing or expired.
    pub fn append(&self, key: &str, suffix: &[u8]) -> bool {
        self.splice(key, suffix, false)
    }

    /// Like [`append`](Cache::append), but prefixes instead.
    pub fn prepend(&self, key: &str, prefix: &[u8]) -> bool {
        self.splice(key, prefix, true)
    }

    fn splice(&self, key: &str, piece: &[u8], front: bool) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        match state.records.get_mut(key) {
            Some(record) if record.is_valid(now) => {
                let mut joined = Vec::with_capacity(record.value.len() + piece.len());
                if front {
                    joined.extend_from_slice(piece);
                    joined.extend_from_slice(&record.value);
                } else {
                    joined.extend_from_slice(&record.value);
                    joined.extend_from_slice(piece);
                }
                record.value = Bytes::from(joined);
                true
            }
            _ => false,
        }
    }

    /// Removes `key`. Returns `true` only if a live record was removed; an
    /// expired record is reclaimed silently but reports `false`.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        let removed = state.records.remove(key);
        drop(state);

        self.schedule_purge();
        matches!(removed, Some(record) if record.is_valid(now))
    }

    /// Adds `delta` (which may be negative) to a stored integer.
    ///
    /// Returns `Ok(None)` when the key is missing or expired. Fails with
    /// [`Error::NonNumeric`] when the stored value does not parse as an
    /// integer. The result is clamped at zero and written back as its
    /// decimal string.
    pub fn incr(&self, key: &str, delta: i64) -> Result<Option<u64>> {
        let mut state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        let record = match state.records.get_mut(key) {
            Some(record) if record.is_valid(now) => record,
            _ => return Ok(None),
        };

        let current: i64 = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or(Error::NonNumeric)?;

        let next = current.saturating_add(delta).max(0) as u64;
        record.value = Bytes::from(next.to_string());
        Ok(Some(next))
    }

    /// `incr` with the amount negated.
    pub fn decr(&self, key: &str, delta: i64) -> Result<Option<u64>> {
        self.incr(key, delta.saturating_neg())
    }

    /// Re-encodes the expiration of an existing record; nothing else changes.
    /// Returns `false` when the key is missing or expired.
    pub fn touch(&self, key: &str, expiration_secs: i64) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let now = epoch_ms();
        let touched = match state.records.get_mut(key) {
            Some(record) if record.is_valid(now) => {
                record.touch(expiration_secs);
                true
            }
            _ => false,
        };
        drop(state);

        self.schedule_purge();
        touched
    }

    /// Empties the cache immediately.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.records.clear();
        state.insertion.clear();
        debug!("cache flushed");
    }

    /// Schedules a [`flush`](Cache::flush) after `delay_secs` and returns
    /// immediately. Overlapping schedules are independent; each fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn flush_all(&self, delay_secs: u64) {
        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            cache.flush();
        });
    }

    /// The server identification string, `"<appname>-<semver>"`.
    pub fn version(&self) -> String {
        format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// Number of records currently in the map (live or not yet reclaimed).
    pub fn current_items(&self) -> usize {
        self.shared.state.lock().unwrap().records.len()
    }

    /// Count of successful stores over the cache's lifetime.
    pub fn total_items(&self) -> u64 {
        self.shared.state.lock().unwrap().total_items
    }

    /// Records the listening port so stats can report it.
    pub fn set_port(&self, port: u16) {
        self.shared.port.store(port, Ordering::Relaxed);
    }

    /// Server statistics as ordered name/value pairs, the names exactly as
    /// they go over the wire.
    pub fn stats(&self) -> Vec<(String, String)> {
        let (curr_items, total_items) = {
            let state = self.shared.state.lock().unwrap();
            (state.records.len(), state.total_items)
        };
        let max_bytes = match self.shared.config {
            CacheConfig::ByMaxSizeMb(mb) => mb * 1024 * 1024,
            _ => 0,
        };
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        vec![
            ("pid".into(), std::process::id().to_string()),
            ("uptime".into(), self.shared.started.elapsed().as_secs().to_string()),
            ("time".into(), unix_secs.to_string()),
            ("version".into(), self.version()),
            ("curr_items".into(), curr_items.to_string()),
            ("total_items".into(), total_items.to_string()),
            ("bytes".into(), memory::resident_set_bytes().to_string()),
            ("max_bytes".into(), max_bytes.to_string()),
            ("tcpport".into(), self.shared.port.load(Ordering::Relaxed).to_string()),
            ("num_threads".into(), "1".into()),
            ("cas_enabled".into(), "no".into()),
            ("evictions".into(), "on".into()),
        ]
    }

    /// Runs one purge pass synchronously and returns how many records were
    /// removed. Normally invoked by the purge worker; callable directly when
    /// no worker is running (embedded use, tests).
    pub fn purge(&self) -> usize {
        match self.shared.config {
            CacheConfig::Unbounded => 0,
            CacheConfig::ByMaxRecords(max) => self.purge_by_count(max),
            CacheConfig::ByMaxSizeMb(limit_mb) => self.purge_by_size(limit_mb),
        }
    }

    fn purge_by_count(&self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        let mut state = self.shared.state.lock().unwrap();
        let mut removed = 0;
        while state.records.len() >= max {
            if !evict_oldest(&mut state) {
                break;
            }
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, remaining = state.records.len(), "count-bounded purge");
        }
        removed
    }

    fn purge_by_size(&self, limit_mb: u64) -> usize {
        if limit_mb == 0 || memory::resident_set_mb() < limit_mb {
            return 0;
        }

        let mut state = self.shared.state.lock().unwrap();
        // Reborrow so the queue and the map can be borrowed independently.
        let state = &mut *state;

        // First sweep: drop everything already expired.
        let now = epoch_ms();
        let before = state.records.len();
        state.records.retain(|_, record| record.is_valid(now));
        let records = &state.records;
        state.insertion.retain(|key| records.contains_key(key));
        let mut removed = before - state.records.len();

        // Re-sample after the sweep; if the process is still over the limit,
        // evict in insertion order, re-sampling between chunks. Freed map
        // entries may not lower RSS promptly, so the loop also ends when the
        // map is empty.
        while memory::resident_set_mb() >= limit_mb && !state.records.is_empty() {
            for _ in 0..EVICTION_CHUNK {
                if !evict_oldest(state) {
                    break;
                }
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, remaining = state.records.len(), "size-bounded purge");
        }
        removed
    }

    /// Wakes the purge worker; returns immediately.
    fn schedule_purge(&self) {
        self.shared.purge_wanted.notify_one();
    }

    /// Resolves when a mutation has requested a purge pass.
    pub(crate) async fn purge_requested(&self) {
        self.shared.purge_wanted.notified().await;
    }
}

/// Removes the oldest live queue entry from the map. Stale queue entries
/// (keys deleted since they were enqueued) are discarded along the way.
/// Returns `false` when the queue is exhausted.
fn evict_oldest(state: &mut State) -> bool {
    while let Some(key) = state.insertion.pop_front() {
        if state.records.remove(&key).is_some() {
            return true;
        }
    }
    false
}
