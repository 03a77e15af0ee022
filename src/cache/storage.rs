//! Cache storage trait and in-memory implementation.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, FetchError};

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync + 'static {
  /// Get the entry for a key.
  fn get(&self, key: &str) -> Option<CacheEntry>;

  /// Store a value confirmed by the server (clears error and invalidation).
  fn store_value(&self, key: &str, value: Value);

  /// Write a value that the server has not confirmed yet.
  ///
  /// `fetched_at` is left alone so staleness is still judged against the last
  /// real fetch.
  fn write_local(&self, key: &str, value: Value);

  /// Record a failed fetch, keeping any previous value.
  fn store_error(&self, key: &str, error: FetchError);

  /// Flag an entry for revalidation. Returns false if the key is unknown.
  fn invalidate(&self, key: &str) -> bool;

  /// Put back a snapshot taken earlier (`None` removes the entry).
  fn restore(&self, key: &str, snapshot: Option<CacheEntry>);

  /// All keys currently held.
  fn keys(&self) -> Vec<String>;
}

/// Process-local cache. Entries live as long as the client does; nothing is
/// written to disk.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    // A panic while holding the lock leaves the map itself consistent
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    self.entries().get(key).cloned()
  }

  fn store_value(&self, key: &str, value: Value) {
    self.entries().insert(
      key.to_string(),
      CacheEntry {
        value: Some(value),
        error: None,
        fetched_at: Some(Utc::now()),
        invalidated: false,
      },
    );
  }

  fn write_local(&self, key: &str, value: Value) {
    let mut entries = self.entries();
    let entry = entries.entry(key.to_string()).or_default();
    entry.value = Some(value);
  }

  fn store_error(&self, key: &str, error: FetchError) {
    let mut entries = self.entries();
    let entry = entries.entry(key.to_string()).or_default();
    entry.error = Some(error);
  }

  fn invalidate(&self, key: &str) -> bool {
    match self.entries().get_mut(key) {
      Some(entry) => {
        entry.invalidated = true;
        true
      }
      None => false,
    }
  }

  fn restore(&self, key: &str, snapshot: Option<CacheEntry>) {
    let mut entries = self.entries();
    match snapshot {
      Some(entry) => {
        entries.insert(key.to_string(), entry);
      }
      None => {
        entries.remove(key);
      }
    }
  }

  fn keys(&self) -> Vec<String> {
    self.entries().keys().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_store_value_clears_error_and_invalidation() {
    let storage = MemoryStorage::new();
    storage.store_error("/classes", FetchError::new("offline"));
    storage.invalidate("/classes");
    storage.store_value("/classes", json!([]));

    let entry = storage.get("/classes").unwrap();
    assert_eq!(entry.value, Some(json!([])));
    assert!(entry.error.is_none());
    assert!(!entry.invalidated);
    assert!(entry.fetched_at.is_some());
  }

  #[test]
  fn test_error_keeps_previous_value() {
    let storage = MemoryStorage::new();
    storage.store_value("/students", json!([{"id": "1"}]));
    storage.store_error("/students", FetchError::with_status(500, "boom", None));

    let entry = storage.get("/students").unwrap();
    assert_eq!(entry.value, Some(json!([{"id": "1"}])));
    assert_eq!(entry.error.unwrap().status, Some(500));
  }

  #[test]
  fn test_local_write_keeps_fetch_time() {
    let storage = MemoryStorage::new();
    storage.write_local("/parents", json!([]));
    assert!(storage.get("/parents").unwrap().fetched_at.is_none());
  }

  #[test]
  fn test_restore_none_removes() {
    let storage = MemoryStorage::new();
    storage.write_local("/users", json!([]));
    storage.restore("/users", None);
    assert!(storage.get("/users").is_none());
    assert!(!storage.invalidate("/users"));
  }
}
