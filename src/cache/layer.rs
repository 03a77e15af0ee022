//! Stale-while-revalidate cache that sits between views and the fetcher.

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::storage::{CacheStorage, MemoryStorage};
use super::traits::{CacheEntry, CacheEvent, CacheEventKind, CacheResult, FetchError};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Cache keyed by resource URL.
///
/// Reads serve whatever is cached and refresh it in the background once it
/// goes stale. Concurrent fetches of one key share a single request, and
/// every change is broadcast so bound views can re-render.
pub struct SwrCache<S: CacheStorage = MemoryStorage> {
  inner: Arc<Inner<S>>,
}

struct Inner<S> {
  storage: S,
  requests: Mutex<Requests>,
  events: broadcast::Sender<CacheEvent>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  /// Completed fetches younger than this are reused instead of repeated
  dedupe_interval: Duration,
}

/// Requests in flight, and a counter per key bumped by every local write.
///
/// A fetch remembers the epoch it started under; if a write lands before it
/// answers, its response describes data that no longer exists and is dropped.
#[derive(Default)]
struct Requests {
  inflight: HashMap<String, SharedFetch>,
  epochs: HashMap<String, u64>,
}

impl Requests {
  fn epoch(&self, key: &str) -> u64 {
    self.epochs.get(key).copied().unwrap_or(0)
  }
}

#[cfg(test)]
impl SwrCache<MemoryStorage> {
  /// 60 s stale time and a 2 s de-duplication window
  pub fn in_memory() -> Self {
    Self::with_timing(
      MemoryStorage::new(),
      std::time::Duration::from_secs(60),
      std::time::Duration::from_secs(2),
    )
  }
}

impl<S: CacheStorage> SwrCache<S> {
  pub fn with_timing(
    storage: S,
    stale_time: std::time::Duration,
    dedupe_interval: std::time::Duration,
  ) -> Self {
    let (events, _) = broadcast::channel(256);
    Self {
      inner: Arc::new(Inner {
        storage,
        requests: Mutex::new(Requests::default()),
        events,
        stale_time: to_chrono(stale_time),
        dedupe_interval: to_chrono(dedupe_interval),
      }),
    }
  }

  /// Subscribe to change notifications for every key.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Current entry for a key, without triggering any fetch.
  pub fn read(&self, key: &str) -> Option<CacheEntry> {
    self.inner.storage.get(key)
  }

  /// Cached value decoded as `T`, if present and decodable.
  #[cfg(test)]
  pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self
      .read(key)
      .and_then(|entry| entry.value)
      .and_then(|value| serde_json::from_value(value).ok())
  }

  /// Check whether an entry needs revalidating.
  pub fn is_stale(&self, entry: &CacheEntry) -> bool {
    if entry.invalidated || entry.value.is_none() {
      return true;
    }
    match entry.fetched_at {
      Some(at) => Utc::now() - at > self.inner.stale_time,
      None => true,
    }
  }

  fn recently_fetched(&self, entry: &CacheEntry) -> bool {
    !entry.invalidated
      && entry.value.is_some()
      && entry
        .fetched_at
        .map(|at| Utc::now() - at < self.inner.dedupe_interval)
        .unwrap_or(false)
  }

  /// Fetch with stale-while-revalidate semantics.
  ///
  /// 1. Fresh cache: return it
  /// 2. Stale cache: return it now, revalidate in the background
  /// 3. Nothing cached: wait for the network
  pub async fn fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<Value>, FetchError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    if let Some(entry) = self.inner.storage.get(key) {
      if let Some(value) = entry.value.clone() {
        if !self.is_stale(&entry) {
          debug!(key, "cache hit");
          return Ok(CacheResult::from_cache(value, entry.fetched_at, false));
        }

        debug!(key, "serving stale entry while revalidating");
        let cache = self.clone();
        let owned_key = key.to_string();
        tokio::spawn(async move {
          // Outcome lands in the cache and is broadcast from there
          let _ = cache.revalidate(&owned_key, fetcher).await;
        });
        return Ok(CacheResult::from_cache(value, entry.fetched_at, true));
      }
    }

    let data = self.revalidate(key, fetcher).await?;
    Ok(CacheResult::from_network(data))
  }

  /// Fetch from the network now, sharing any request already in flight for
  /// the same key. The outcome is stored and broadcast exactly once.
  pub async fn revalidate<F, Fut>(&self, key: &str, fetcher: F) -> Result<Value, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    if let Some(entry) = self.inner.storage.get(key) {
      if self.recently_fetched(&entry) {
        if let Some(value) = entry.value {
          debug!(key, "reusing result inside de-duplication window");
          return Ok(value);
        }
      }
    }

    let shared = {
      let mut requests = self.requests();
      let epoch = requests.epoch(key);
      match requests.inflight.get(key) {
        Some(existing) => {
          debug!(key, "joining in-flight request");
          existing.clone()
        }
        None => {
          let cache = self.clone();
          let owned_key = key.to_string();
          let request = fetcher();
          let fut = async move {
            let result = request.await;
            cache.settle(&owned_key, epoch, &result);
            result
          }
          .boxed()
          .shared();
          requests.inflight.insert(key.to_string(), fut.clone());
          fut
        }
      }
    };

    shared.await
  }

  fn settle(&self, key: &str, epoch: u64, result: &Result<Value, FetchError>) {
    let kind = {
      // Held while storing so a write cannot slip in between the check and
      // the store
      let mut requests = self.requests();
      if requests.epoch(key) != epoch {
        debug!(key, "dropping response that predates a local write");
        return;
      }
      requests.inflight.remove(key);
      match result {
        Ok(value) => {
          self.inner.storage.store_value(key, value.clone());
          CacheEventKind::Updated
        }
        Err(error) => {
          warn!(key, status = ?error.status, "fetch failed: {}", error);
          self.inner.storage.store_error(key, error.clone());
          CacheEventKind::Failed
        }
      }
    };
    self.notify(key, kind);
  }

  /// Start a new epoch for `key`. Requests already running for it are
  /// forgotten, so the next revalidation goes back to the network.
  fn bump(&self, key: &str) {
    let mut requests = self.requests();
    *requests.epochs.entry(key.to_string()).or_insert(0) += 1;
    requests.inflight.remove(key);
  }

  /// Mark a key stale and tell subscribers to refetch it.
  pub fn invalidate(&self, key: &str) {
    self.bump(key);
    self.inner.storage.invalidate(key);
    self.notify(key, CacheEventKind::Invalidated);
  }

  /// Invalidate every cached key starting with `prefix`.
  pub fn invalidate_prefix(&self, prefix: &str) {
    for key in self.inner.storage.keys() {
      if key.starts_with(prefix) {
        self.invalidate(&key);
      }
    }
  }

  /// Replace the cached value with data the server already confirmed.
  #[cfg(test)]
  pub fn mutate(&self, key: &str, value: Value) {
    self.bump(key);
    self.inner.storage.store_value(key, value);
    self.notify(key, CacheEventKind::Updated);
  }

  /// Apply `update` to the cached value immediately, then run `commit`.
  ///
  /// On success the key is invalidated so the server's version replaces the
  /// optimistic one. On failure the previous entry is restored and the error
  /// returned.
  pub async fn mutate_optimistic<U, Fut, R>(
    &self,
    key: &str,
    update: U,
    commit: Fut,
  ) -> Result<R, FetchError>
  where
    U: FnOnce(Option<&Value>) -> Value,
    Fut: Future<Output = Result<R, FetchError>>,
  {
    self.bump(key);
    let snapshot = self.inner.storage.get(key);
    let optimistic = update(snapshot.as_ref().and_then(|e| e.value.as_ref()));
    self.inner.storage.write_local(key, optimistic);
    self.notify(key, CacheEventKind::Updated);

    match commit.await {
      Ok(result) => {
        self.invalidate(key);
        Ok(result)
      }
      Err(error) => {
        warn!(key, "optimistic update rolled back: {}", error);
        self.bump(key);
        self.inner.storage.restore(key, snapshot);
        self.notify(key, CacheEventKind::RolledBack);
        Err(error)
      }
    }
  }

  fn notify(&self, key: &str, kind: CacheEventKind) {
    // No subscribers is fine
    let _ = self.inner.events.send(CacheEvent {
      key: key.to_string(),
      kind,
    });
  }

  fn requests(&self) -> MutexGuard<'_, Requests> {
    self.inner.requests.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<S: CacheStorage> Clone for SwrCache<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
  Duration::from_std(duration).unwrap_or_else(|_| Duration::days(365))
}
