//! Async query bound to one cache key, for views that render fetched data.
//!
//! Inspired by SWR/TanStack Query, a `Query<T>` is the `useResource(url)` of
//! the dashboards: it exposes `{data, error, is_loading}` for a key, starts a
//! fetch on mount, follows cache events for its key (so a mutation made
//! anywhere re-renders it), and revalidates on an interval or when its view
//! regains focus.
//!
//! # Example
//!
//! ```ignore
//! let api = api_client.clone();
//! let url = ResourceKey::Classes.url(api.base_url());
//! let mut query: Query<Vec<Class>> = Query::new(cache.clone(), url.clone(), move || {
//!     let api = api.clone();
//!     let url = url.clone();
//!     async move { api.get_json(&url).await }
//! });
//!
//! query.mount();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError as BroadcastTryRecvError};
use tokio::sync::mpsc;

use crate::cache::{CacheEventKind, CacheEvent, FetchError, SwrCache};

/// A factory that creates futures for fetching the raw JSON of a resource
type FetcherFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, FetchError>> + Send + Sync>;

/// Revalidation triggers for a query
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// Refetch this often while mounted
  pub refresh_interval: Option<Duration>,
  /// Refetch when the owning view regains focus
  pub revalidate_on_focus: bool,
  /// How long data stays fresh for this query. `None` uses the cache's
  /// setting.
  pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      refresh_interval: None,
      revalidate_on_focus: true,
      stale_time: None,
    }
  }
}

pub struct Query<T> {
  cache: SwrCache,
  key: String,
  fetcher: FetcherFn,
  options: QueryOptions,
  data: Option<T>,
  error: Option<String>,
  validating: bool,
  receiver: Option<mpsc::UnboundedReceiver<Result<Value, FetchError>>>,
  events: broadcast::Receiver<CacheEvent>,
  last_fetch: Option<Instant>,
}

impl<T: DeserializeOwned + Send + 'static> Query<T> {
  /// Bind a cache key to a fetcher.
  ///
  /// The fetcher is called each time the cache decides the key needs to go to
  /// the network; de-duplication happens in the cache, not here.
  pub fn new<F, Fut>(cache: SwrCache, key: String, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
  {
    let events = cache.subscribe();
    Self {
      cache,
      key,
      fetcher: Arc::new(move || fetcher().boxed()),
      options: QueryOptions::default(),
      data: None,
      error: None,
      validating: false,
      receiver: None,
      events,
      last_fetch: None,
    }
  }

  pub fn with_options(mut self, options: QueryOptions) -> Self {
    self.options = options;
    self
  }

  /// Decoded data, possibly stale while a revalidation runs.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  /// Error from the last fetch. Data from before the failure stays available.
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// True only while there is nothing to show yet.
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && self.validating
  }

  /// True whenever a request is running, including background refreshes.
  pub fn is_validating(&self) -> bool {
    self.validating
  }

  /// Show whatever is cached and start the first fetch.
  pub fn mount(&mut self) {
    self.reload_from_cache();
    match self.options.stale_time {
      Some(stale_time) if self.fresh_within(stale_time) => {}
      Some(_) => self.start(true),
      None => self.start(false),
    }
  }

  /// Cached data confirmed by the server less than `stale_time` ago
  fn fresh_within(&self, stale_time: Duration) -> bool {
    let Some(entry) = self.cache.read(&self.key) else {
      return false;
    };
    let age = entry
      .fetched_at
      .and_then(|at| (Utc::now() - at).to_std().ok());
    !entry.invalidated && entry.value.is_some() && age.is_some_and(|age| age < stale_time)
  }

  /// Force a refetch, bypassing the stale check.
  pub fn refetch(&mut self) {
    self.start(true);
  }

  /// The owning view became visible again.
  pub fn focus(&mut self) {
    if self.options.revalidate_on_focus {
      self.start(true);
    }
  }

  /// Pick up finished fetches, cache events for this key and due interval
  /// refreshes.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if let Some(receiver) = &mut self.receiver {
      match receiver.try_recv() {
        Ok(result) => {
          self.receiver = None;
          self.validating = false;
          match result {
            Ok(value) => self.apply_value(value),
            Err(error) => self.error = Some(error.message),
          }
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => {}
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.receiver = None;
          self.validating = false;
          self.error = Some("Query was cancelled".to_string());
          changed = true;
        }
      }
    }

    loop {
      match self.events.try_recv() {
        Ok(event) if event.key == self.key => {
          self.handle_event(event.kind);
          changed = true;
        }
        Ok(_) => {}
        Err(BroadcastTryRecvError::Lagged(_)) => {
          self.reload_from_cache();
          changed = true;
        }
        Err(BroadcastTryRecvError::Empty) | Err(BroadcastTryRecvError::Closed) => break,
      }
    }

    if let Some(interval) = self.options.refresh_interval {
      let due = self
        .last_fetch
        .map(|at| at.elapsed() >= interval)
        .unwrap_or(false);
      if due && !self.validating {
        self.start(true);
        changed = true;
      }
    }

    changed
  }

  fn handle_event(&mut self, kind: CacheEventKind) {
    match kind {
      CacheEventKind::Updated | CacheEventKind::RolledBack | CacheEventKind::Failed => {
        self.reload_from_cache()
      }
      CacheEventKind::Invalidated => self.start(true),
    }
  }

  fn reload_from_cache(&mut self) {
    if let Some(entry) = self.cache.read(&self.key) {
      if let Some(value) = entry.value {
        self.apply_value(value);
      }
      if let Some(error) = entry.error {
        self.error = Some(error.message);
      }
    }
  }

  fn apply_value(&mut self, value: Value) {
    match serde_json::from_value::<T>(value) {
      Ok(data) => {
        self.data = Some(data);
        self.error = None;
      }
      Err(e) => self.error = Some(format!("Unexpected response: {}", e)),
    }
  }

  fn start(&mut self, force: bool) {
    let (tx, rx) = mpsc::unbounded_channel();
    // Replacing the receiver drops interest in any earlier request
    self.receiver = Some(rx);
    self.validating = true;
    self.last_fetch = Some(Instant::now());

    let cache = self.cache.clone();
    let key = self.key.clone();
    let fetcher = Arc::clone(&self.fetcher);
    tokio::spawn(async move {
      let result = if force {
        cache.revalidate(&key, move || fetcher()).await
      } else {
        cache.fetch(&key, move || fetcher()).await.map(|r| r.data)
      };
      // Ignore send errors - the query may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("validating", &self.validating)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn counting_query(
    cache: &SwrCache,
    counter: &Arc<AtomicU32>,
  ) -> Query<Vec<u32>> {
    let counter = Arc::clone(counter);
    Query::new(cache.clone(), "/numbers".to_string(), move || {
      let counter = Arc::clone(&counter);
      async move {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!([n]))
      }
    })
  }

  async fn settle(query: &mut Query<Vec<u32>>) {
    tokio::time::sleep(Duration::from_millis(30)).await;
    query.poll();
  }

  #[tokio::test]
  async fn test_mount_loads_data() {
    let cache = SwrCache::in_memory();
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter);

    query.mount();
    assert!(query.is_loading());

    settle(&mut query).await;
    assert!(!query.is_loading());
    assert_eq!(query.data(), Some(&vec![1]));
    assert_eq!(query.error(), None);
  }

  #[tokio::test]
  async fn test_two_mounts_share_one_fetch() {
    let cache = SwrCache::in_memory();
    let counter = Arc::new(AtomicU32::new(0));
    let mut first = counting_query(&cache, &counter);
    let mut second = counting_query(&cache, &counter);

    first.mount();
    second.mount();
    settle(&mut first).await;
    second.poll();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(second.data(), Some(&vec![1]));
  }

  #[tokio::test]
  async fn test_follows_local_mutations() {
    let cache = SwrCache::in_memory();
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter);
    query.mount();
    settle(&mut query).await;

    cache.mutate("/numbers", json!([7, 8]));
    assert!(query.poll());
    assert_eq!(query.data(), Some(&vec![7, 8]));
  }

  #[tokio::test]
  async fn test_invalidation_triggers_refetch() {
    let cache = SwrCache::in_memory();
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter);
    query.mount();
    settle(&mut query).await;

    cache.invalidate("/numbers");
    query.poll();
    settle(&mut query).await;

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(&vec![2]));
  }

  #[tokio::test]
  async fn test_refresh_interval() {
    let cache = SwrCache::with_timing(
      crate::cache::MemoryStorage::new(),
      Duration::from_secs(60),
      Duration::ZERO,
    );
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter).with_options(QueryOptions {
      refresh_interval: Some(Duration::from_millis(20)),
      revalidate_on_focus: false,
      stale_time: None,
    });
    query.mount();
    settle(&mut query).await;

    // Interval elapsed during settle; this poll starts the refresh
    query.poll();
    settle(&mut query).await;

    assert!(counter.load(Ordering::SeqCst) >= 2);
  }

  #[tokio::test]
  async fn test_focus_respects_option() {
    let cache = SwrCache::with_timing(
      crate::cache::MemoryStorage::new(),
      Duration::from_secs(60),
      Duration::ZERO,
    );
    let counter = Arc::new(AtomicU32::new(0));
    let mut query = counting_query(&cache, &counter).with_options(QueryOptions {
      revalidate_on_focus: false,
      ..QueryOptions::default()
    });
    query.mount();
    settle(&mut query).await;

    query.focus();
    settle(&mut query).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_own_stale_time() {
    let cache = SwrCache::with_timing(
      crate::cache::MemoryStorage::new(),
      Duration::from_secs(60),
      Duration::ZERO,
    );
    cache.mutate("/numbers", json!([5]));
    let counter = Arc::new(AtomicU32::new(0));

    let mut patient = counting_query(&cache, &counter).with_options(QueryOptions {
      stale_time: Some(Duration::from_secs(300)),
      ..QueryOptions::default()
    });
    patient.mount();
    settle(&mut patient).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(patient.data(), Some(&vec![5]));

    // Anything cached is already too old for this one
    let mut eager = counting_query(&cache, &counter).with_options(QueryOptions {
      stale_time: Some(Duration::ZERO),
      ..QueryOptions::default()
    });
    eager.mount();
    settle(&mut eager).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(eager.data(), Some(&vec![1]));
  }

  #[tokio::test]
  async fn test_error_keeps_stale_data() {
    let cache = SwrCache::in_memory();
    cache.mutate("/numbers", json!([3]));
    cache.invalidate("/numbers");

    let mut query: Query<Vec<u32>> = Query::new(cache.clone(), "/numbers".to_string(), || async {
      Err(FetchError::with_status(500, "Internal error", None))
    });
    query.mount();
    assert_eq!(query.data(), Some(&vec![3]));

    tokio::time::sleep(Duration::from_millis(30)).await;
    query.poll();
    assert_eq!(query.data(), Some(&vec![3]));
    assert_eq!(query.error(), Some("Internal error"));
  }
}
