//! Cached API client that hands out queries and a mutator sharing one cache.

use color_eyre::Result;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::cache::{MemoryStorage, SwrCache};
use crate::config::Config;
use crate::query::{Query, QueryOptions};

use super::cache::ResourceKey;
use super::client::ApiClient;
use super::mutation::Mutator;
use super::types::DashboardStats;

/// Own-API client with stale-while-revalidate caching.
///
/// Every query built here reads through the same cache, so two views showing
/// the same resource make one request, and a mutation refreshes both.
#[derive(Clone)]
pub struct CachedApiClient {
  api: ApiClient,
  cache: SwrCache,
  mutator: Mutator,
  dashboard_refresh: Duration,
}

impl CachedApiClient {
  pub fn new(config: &Config, token: Option<String>) -> Result<Self> {
    let api = ApiClient::new(&config.api_base_url(), token)?;
    let cache = SwrCache::with_timing(
      MemoryStorage::new(),
      Duration::from_secs(config.client.stale_secs),
      Duration::from_secs(config.client.dedupe_secs),
    );
    let mutator = Mutator::new(api.clone(), cache.clone());

    Ok(Self {
      api,
      cache,
      mutator,
      dashboard_refresh: Duration::from_secs(config.client.dashboard_refresh_secs),
    })
  }

  pub fn base_url(&self) -> &str {
    self.api.base_url()
  }

  pub fn mutator(&self) -> &Mutator {
    &self.mutator
  }

  /// A query for `key`, decoded as `T`. Revalidates when its view regains
  /// focus.
  pub fn query<T: DeserializeOwned + Send + 'static>(&self, key: &ResourceKey) -> Query<T> {
    let url = key.url(self.api.base_url());
    let api = self.api.clone();
    let fetch_url = url.clone();
    Query::new(self.cache.clone(), url, move || {
      let api = api.clone();
      let url = fetch_url.clone();
      async move { api.get_json(&url).await }
    })
  }

  /// The dashboard summary, polled on the configured interval.
  pub fn dashboard(&self) -> Query<DashboardStats> {
    self.query(&ResourceKey::Dashboard).with_options(QueryOptions {
      refresh_interval: Some(self.dashboard_refresh),
      ..QueryOptions::default()
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::school::types::Class;
  use axum::routing::get;
  use axum::{Json, Router};
  use serde_json::json;

  #[tokio::test]
  async fn test_queries_share_cache() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route(
      "/api/classes",
      get(|| async { Json(json!({ "success": true, "data": [{ "id": 1, "name": "JSS1A" }] })) }),
    );
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });

    let mut config = Config::default();
    config.client.api_url = Some(format!("http://{}/api", addr));
    let client = CachedApiClient::new(&config, None).unwrap();

    let mut first: Query<Vec<Class>> = client.query(&ResourceKey::Classes);
    first.mount();
    tokio::time::sleep(Duration::from_millis(100)).await;
    first.poll();
    assert_eq!(first.data().unwrap()[0].id, "1");

    // A second view mounting later sees the cached list at once
    let mut second: Query<Vec<Class>> = client.query(&ResourceKey::Classes);
    second.mount();
    assert_eq!(second.data().unwrap()[0].name, "JSS1A");
  }
}
