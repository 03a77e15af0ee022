//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Trait for records that live inside cached lists.
///
/// Optimistic updates splice records into and out of a cached array by
/// `cache_key`, so it must be unique within a list.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this record (e.g. the backend id)
  fn cache_key(&self) -> String;

  /// Entity type name used in logs (e.g. "student")
  fn entity_type() -> &'static str;
}

/// Error produced by a fetcher.
///
/// Cloneable so one in-flight request can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
  /// HTTP status, if a response was received
  pub status: Option<u16>,
  pub message: String,
  /// Parsed response body, if it was JSON
  pub body: Option<Value>,
}

impl FetchError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      status: None,
      message: message.into(),
      body: None,
    }
  }

  pub fn with_status(status: u16, message: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      status: Some(status),
      message: message.into(),
      body,
    }
  }
}

/// One cache slot, keyed by resource URL.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
  /// Last successfully fetched (or optimistically written) value
  pub value: Option<Value>,
  /// Error from the most recent fetch, cleared on success
  pub error: Option<FetchError>,
  /// When `value` was last confirmed by the server
  pub fetched_at: Option<DateTime<Utc>>,
  /// Set by invalidation; forces the next read to revalidate
  pub invalidated: bool,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, served while a background revalidation runs
  CacheStale,
}

/// Change notification broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
  pub key: String,
  pub kind: CacheEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
  /// A new value was stored (fetched or written locally)
  Updated,
  /// A fetch failed; the entry carries the error
  Failed,
  /// The entry should be refetched by whoever displays it
  Invalidated,
  /// An optimistic write was undone
  RolledBack,
}

/// Insert `record` into a cached JSON array, replacing the element with the
/// same cache key if present. A missing or non-array value starts a new list.
pub fn upsert_record<T: Cacheable>(list: Option<&Value>, record: &T) -> Value {
  let mut items: Vec<Value> = match list {
    Some(Value::Array(items)) => items.clone(),
    _ => Vec::new(),
  };
  let key = record.cache_key();
  let encoded = serde_json::to_value(record).unwrap_or(Value::Null);

  let existing = items.iter().position(|item| {
    serde_json::from_value::<T>(item.clone())
      .map(|r| r.cache_key() == key)
      .unwrap_or(false)
  });

  match existing {
    Some(idx) => items[idx] = encoded,
    None => items.push(encoded),
  }
  Value::Array(items)
}

/// Remove the record with `key` from a cached JSON array.
pub fn remove_record<T: Cacheable>(list: Option<&Value>, key: &str) -> Value {
  let items: Vec<Value> = match list {
    Some(Value::Array(items)) => items
      .iter()
      .filter(|item| {
        serde_json::from_value::<T>((*item).clone())
          .map(|r| r.cache_key() != key)
          .unwrap_or(true)
      })
      .cloned()
      .collect(),
    _ => Vec::new(),
  };
  Value::Array(items)
}
