//! The embeddable, in-process cache surface.
//!
//! Two pieces: the [`Value`] adapter methods on [`Cache`] (structured values
//! serialize to JSON on the way in and parse back on the way out), and a
//! process-wide default instance behind explicit `init`/`teardown` entry
//! points, for callers that want a cache without threading a handle around.

use std::sync::{Mutex, OnceLock};

use crate::cache::{Cache, CacheConfig};
use crate::protocol::types::Value;

fn slot() -> &'static Mutex<Option<Cache>> {
    static SLOT: OnceLock<Mutex<Option<Cache>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Installs a fresh process-default cache with the given bound, replacing
/// any previous one, and returns a handle to it.
pub fn init(config: CacheConfig) -> Cache {
    let cache = Cache::new(config);
    *slot().lock().unwrap() = Some(cache.clone());
    cache
}

/// A handle to the process-default cache, creating an unbounded one on
/// first use.
pub fn default_cache() -> Cache {
    let mut guard = slot().lock().unwrap();
    match guard.as_ref() {
        Some(cache) => cache.clone(),
        None => {
            let cache = Cache::new(CacheConfig::default());
            *guard = Some(cache.clone());
            cache
        }
    }
}

/// Drops the process-default cache. The next [`default_cache`] call starts
/// over empty.
pub fn teardown() {
    *slot().lock().unwrap() = None;
}

impl Cache {
    /// Stores an in-process [`Value`], serializing structured values on the
    /// way in.
    pub fn set_item(&self, key: &str, value: &Value, expiration_secs: i64, flags: u32) -> bool {
        self.set(key, value.to_wire(), expiration_secs, flags)
    }

    /// Retrieves an in-process [`Value`], reversing the serialization.
    pub fn get_item(&self, key: &str) -> Option<Value> {
        self.get(key).map(|bytes| Value::from_wire(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_round_trip_in_process() {
        let cache = Cache::new(CacheConfig::Unbounded);

        let text = Value::from("plain");
        cache.set_item("text", &text, 0, 0);
        assert_eq!(cache.get_item("text"), Some(text));

        let json = Value::Json(json!({"nested": {"list": [1, 2, 3]}}));
        cache.set_item("json", &json, 0, 0);
        assert_eq!(cache.get_item("json"), Some(json));

        assert_eq!(cache.get_item("missing"), None);
    }

    #[test]
    fn structured_items_are_visible_on_the_wire_side() {
        let cache = Cache::new(CacheConfig::Unbounded);
        cache.set_item("item", &Value::Json(json!({"a": 1})), 0, 0);
        // The stored representation is the JSON serialization.
        assert_eq!(cache.get("item"), Some(bytes::Bytes::from("{\"a\":1}")));
    }

    #[test]
    fn default_cache_lifecycle() {
        // One test owns the whole lifecycle; the slot is process-global.
        teardown();

        let first = default_cache();
        first.set_item("k", &Value::from("v"), 0, 0);
        assert_eq!(default_cache().get_item("k"), Some(Value::from("v")));

        let replaced = init(CacheConfig::ByMaxRecords(10));
        assert_eq!(replaced.get_item("k"), None);
        assert_eq!(default_cache().get_item("k"), None);

        teardown();
        assert_eq!(default_cache().get_item("k"), None);
    }
}
