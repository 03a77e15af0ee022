//! Writes against the own API from the dashboards.
//!
//! Forms are validated before anything goes over the wire, only one
//! submission runs at a time, and every successful write invalidates the
//! cached resources it affects.

use reqwest::Method;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{remove_record, upsert_record, Cacheable, FetchError, SwrCache};

use super::cache::ResourceKey;
use super::client::ApiClient;
use super::forms::{Validate, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
  #[error("{0}")]
  Invalid(ValidationErrors),
  #[error("Another submission is still in progress")]
  InFlight,
  #[error("{0}")]
  Request(#[from] FetchError),
}

/// Submits forms and deletes, keeping the cache in step.
#[derive(Clone)]
pub struct Mutator {
  api: ApiClient,
  cache: SwrCache,
  submitting: Arc<AtomicBool>,
}

/// Clears the submitting flag when the request finishes, however it ends.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

impl Mutator {
  pub fn new(api: ApiClient, cache: SwrCache) -> Self {
    Self {
      api,
      cache,
      submitting: Arc::new(AtomicBool::new(false)),
    }
  }

  /// While true the submit action is disabled.
  pub fn is_submitting(&self) -> bool {
    self.submitting.load(Ordering::SeqCst)
  }

  fn begin(&self) -> Result<SubmitGuard<'_>, MutationError> {
    self
      .submitting
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .map_err(|_| MutationError::InFlight)?;
    Ok(SubmitGuard(&self.submitting))
  }

  fn invalidate(&self, key: &ResourceKey) {
    for dependent in key.dependents() {
      debug!("invalidating {}", dependent.description());
      self.cache.invalidate(&dependent.url(self.api.base_url()));
    }
    // Scoped attendance lists are keyed by id, so clear the whole family
    if matches!(
      key,
      ResourceKey::Attendance
        | ResourceKey::AttendanceByStudent { .. }
        | ResourceKey::AttendanceByClass { .. }
        | ResourceKey::Students
    ) {
      let prefix = format!("{}/", ResourceKey::Attendance.url(self.api.base_url()));
      debug!("invalidating scoped attendance under {}", prefix);
      self.cache.invalidate_prefix(&prefix);
    }
  }

  /// Validate `form`, send it and invalidate everything depending on `key`.
  ///
  /// An invalid form never reaches the network.
  pub async fn submit<F: Validate>(
    &self,
    method: Method,
    path: &str,
    form: &F,
    key: &ResourceKey,
  ) -> Result<Value, MutationError> {
    form.validate().map_err(MutationError::Invalid)?;
    let _guard = self.begin()?;

    let url = self.api.url(path);
    let saved = self.api.send(method.clone(), &url, Some(form)).await?;
    info!(%method, path, "saved {}", key.description());
    self.invalidate(key);
    Ok(saved)
  }

  /// Create a record, showing `pending` in the cached list at `key` until the
  /// server answers. A failure puts the list back the way it was.
  pub async fn create_optimistic<F: Validate, T: Cacheable>(
    &self,
    key: &ResourceKey,
    form: &F,
    pending: T,
  ) -> Result<Value, MutationError> {
    form.validate().map_err(MutationError::Invalid)?;
    let _guard = self.begin()?;

    let list_url = key.url(self.api.base_url());
    let created = self
      .cache
      .mutate_optimistic(
        &list_url,
        |current| upsert_record(current, &pending),
        self.api.send(Method::POST, &list_url, Some(form)),
      )
      .await?;
    info!("created {} in {}", T::entity_type(), key.description());
    self.invalidate(key);
    Ok(created)
  }

  /// Delete the record `id` from the collection at `key`, removing it from
  /// the cached list immediately.
  pub async fn delete_optimistic<T: Cacheable>(
    &self,
    key: &ResourceKey,
    id: &str,
  ) -> Result<(), MutationError> {
    let _guard = self.begin()?;

    let list_url = key.url(self.api.base_url());
    let path = format!("{}/{}", key.path(), id);
    self
      .cache
      .mutate_optimistic(
        &list_url,
        |current| remove_record::<T>(current, id),
        self.api.delete(&path),
      )
      .await?;
    info!("deleted {} {}", T::entity_type(), id);
    self.invalidate(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::school::forms::ClassForm;
  use crate::school::types::Class;
  use axum::extract::State;
  use axum::http::StatusCode;
  use axum::routing::{delete, post};
  use axum::{Json, Router};
  use serde_json::json;
  use std::sync::atomic::AtomicU32;
  use std::time::Duration;

  async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
  }

  fn class_form(name: &str) -> ClassForm {
    ClassForm {
      name: name.to_string(),
      description: None,
    }
  }

  fn pending_class(name: &str) -> Class {
    Class {
      id: "pending".to_string(),
      name: name.to_string(),
      ..Default::default()
    }
  }

  async fn class_api(calls: Arc<AtomicU32>, status: StatusCode, delay_ms: u64) -> String {
    spawn(
      Router::new()
        .route(
          "/api/classes",
          post(
            move |State(calls): State<Arc<AtomicU32>>, Json(body): Json<Value>| async move {
              calls.fetch_add(1, Ordering::SeqCst);
              tokio::time::sleep(Duration::from_millis(delay_ms)).await;
              if status.is_success() {
                (
                  status,
                  Json(json!({ "success": true, "data": { "id": "c1", "name": body["name"] } })),
                )
              } else {
                (status, Json(json!({ "success": false, "error": "Backend said no" })))
              }
            },
          ),
        )
        .route(
          "/api/classes/:id",
          delete(move |State(calls): State<Arc<AtomicU32>>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            (status, Json(json!({ "success": status.is_success() })))
          }),
        )
        .with_state(calls),
    )
    .await
  }

  fn mutator(base: &str) -> Mutator {
    Mutator::new(ApiClient::new(base, None).unwrap(), SwrCache::in_memory())
  }

  #[tokio::test]
  async fn test_invalid_form_never_sent() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(Arc::clone(&calls), StatusCode::CREATED, 0).await;
    let mutator = mutator(&base);

    let err = mutator
      .submit(Method::POST, "/classes", &class_form(""), &ResourceKey::Classes)
      .await
      .unwrap_err();

    match err {
      MutationError::Invalid(errors) => assert!(errors.field("name").is_some()),
      other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!mutator.is_submitting());
  }

  #[tokio::test]
  async fn test_second_submit_rejected_while_in_flight() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(Arc::clone(&calls), StatusCode::CREATED, 100).await;
    let mutator = mutator(&base);

    let first = {
      let mutator = mutator.clone();
      tokio::spawn(async move {
        mutator
          .submit(Method::POST, "/classes", &class_form("JSS1A"), &ResourceKey::Classes)
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(mutator.is_submitting());

    let second = mutator
      .submit(Method::POST, "/classes", &class_form("JSS1B"), &ResourceKey::Classes)
      .await;
    assert_eq!(second, Err(MutationError::InFlight));

    let saved = first.await.unwrap().unwrap();
    assert_eq!(saved["name"], json!("JSS1A"));
    assert!(!mutator.is_submitting());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_submit_invalidates_dependents() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(calls, StatusCode::CREATED, 0).await;
    let mutator = mutator(&base);
    let dashboard = ResourceKey::Dashboard.url(&base);
    mutator.cache.mutate(&dashboard, json!({ "totalClasses": 1 }));

    mutator
      .submit(Method::POST, "/classes", &class_form("JSS1A"), &ResourceKey::Classes)
      .await
      .unwrap();

    let entry = mutator.cache.read(&dashboard).unwrap();
    assert!(entry.invalidated);
  }

  #[test]
  fn test_attendance_write_clears_scoped_lists() {
    let mutator = mutator("http://x/api");
    let by_student = ResourceKey::AttendanceByStudent { id: "s1".into() }.url("http://x/api");
    let by_class = ResourceKey::AttendanceByClass { id: "c1".into() }.url("http://x/api");
    let classes = ResourceKey::Classes.url("http://x/api");
    for key in [&by_student, &by_class, &classes] {
      mutator.cache.mutate(key, json!([]));
    }

    mutator.invalidate(&ResourceKey::Attendance);

    assert!(mutator.cache.read(&by_student).unwrap().invalidated);
    assert!(mutator.cache.read(&by_class).unwrap().invalidated);
    assert!(!mutator.cache.read(&classes).unwrap().invalidated);
  }

  #[tokio::test]
  async fn test_optimistic_create_rolls_back_on_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(calls, StatusCode::BAD_REQUEST, 0).await;
    let mutator = mutator(&base);
    let list = ResourceKey::Classes.url(&base);
    mutator.cache.mutate(&list, json!([{ "id": "c0", "name": "JSS0" }]));

    let err = mutator
      .create_optimistic(&ResourceKey::Classes, &class_form("JSS1A"), pending_class("JSS1A"))
      .await
      .unwrap_err();

    match err {
      MutationError::Request(e) => {
        assert_eq!(e.status, Some(400));
        assert_eq!(e.message, "Backend said no");
      }
      other => panic!("expected request error, got {:?}", other),
    }
    let rows: Vec<Class> = mutator.cache.read_as(&list).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "c0");
  }

  #[tokio::test]
  async fn test_optimistic_create_keeps_row_on_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(calls, StatusCode::CREATED, 0).await;
    let mutator = mutator(&base);
    let list = ResourceKey::Classes.url(&base);
    mutator.cache.mutate(&list, json!([]));

    let created = mutator
      .create_optimistic(&ResourceKey::Classes, &class_form("JSS1A"), pending_class("JSS1A"))
      .await
      .unwrap();
    assert_eq!(created["id"], json!("c1"));

    // The optimistic row stays until the invalidated list is refetched
    let entry = mutator.cache.read(&list).unwrap();
    assert!(entry.invalidated);
    let rows: Vec<Class> = serde_json::from_value(entry.value.unwrap()).unwrap();
    assert_eq!(rows[0].name, "JSS1A");
  }

  #[tokio::test]
  async fn test_optimistic_delete() {
    let calls = Arc::new(AtomicU32::new(0));
    let base = class_api(Arc::clone(&calls), StatusCode::OK, 0).await;
    let mutator = mutator(&base);
    let list = ResourceKey::Classes.url(&base);
    mutator.cache.mutate(
      &list,
      json!([{ "id": "c1", "name": "JSS1A" }, { "id": "c2", "name": "JSS2A" }]),
    );

    mutator
      .delete_optimistic::<Class>(&ResourceKey::Classes, "c1")
      .await
      .unwrap();

    let rows: Vec<Class> = mutator.cache.read_as(&list).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "c2");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
