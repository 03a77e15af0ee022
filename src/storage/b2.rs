//! Backblaze B2 native API, just the calls needed to put and delete pictures.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::BucketConfig;

use super::{NewObject, ObjectStore, StorageError, StoredObject};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Authorization {
  authorization_token: String,
  api_url: String,
  download_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
  upload_url: String,
  authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
  file_id: String,
  file_name: String,
}

pub struct B2Store {
  http: reqwest::Client,
  auth_url: String,
  bucket: BucketConfig,
}

impl B2Store {
  /// Fails when any credential in `bucket` is missing.
  pub fn new(auth_url: &str, bucket: BucketConfig) -> Result<Self, StorageError> {
    let missing = bucket.missing_fields();
    if !missing.is_empty() {
      return Err(StorageError::NotConfigured(missing.join(", ")));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(|e| StorageError::NotConfigured(format!("HTTP client: {}", e)))?;

    Ok(Self {
      http,
      auth_url: auth_url.trim_end_matches('/').to_string(),
      bucket,
    })
  }

  async fn authorize(&self) -> Result<Authorization, StorageError> {
    let url = format!("{}/b2api/v2/b2_authorize_account", self.auth_url);
    let response = self
      .http
      .get(&url)
      .basic_auth(&self.bucket.account_id, Some(&self.bucket.application_key))
      .send()
      .await
      .map_err(|e| StorageError::Authorize(e.to_string()))?;

    decode(response).await.map_err(StorageError::Authorize)
  }

  async fn upload_target(&self, auth: &Authorization) -> Result<UploadTarget, StorageError> {
    let url = format!("{}/b2api/v2/b2_get_upload_url", auth.api_url);
    let response = self
      .http
      .post(&url)
      .header(AUTHORIZATION, &auth.authorization_token)
      .json(&json!({ "bucketId": self.bucket.bucket_id }))
      .send()
      .await
      .map_err(|e| StorageError::UploadUrl(e.to_string()))?;

    decode(response).await.map_err(StorageError::UploadUrl)
  }

  fn download_url(&self, auth: &Authorization, file_name: &str) -> String {
    format!(
      "{}/file/{}/{}",
      auth.download_url.trim_end_matches('/'),
      self.bucket.bucket_name,
      file_name
    )
  }
}

#[async_trait]
impl ObjectStore for B2Store {
  async fn put(&self, object: NewObject) -> Result<StoredObject, StorageError> {
    let auth = self.authorize().await?;
    let target = self.upload_target(&auth).await?;

    let checksum = hex::encode(sha1_smol::Sha1::from(&object.bytes).digest().bytes());
    let encoded_name: String = url::form_urlencoded::byte_serialize(object.name.as_bytes()).collect();
    debug!(name = %object.name, size = object.bytes.len(), "uploading to B2");

    let response = self
      .http
      .post(&target.upload_url)
      .header(AUTHORIZATION, &target.authorization_token)
      .header(CONTENT_TYPE, &object.content_type)
      .header("X-Bz-File-Name", encoded_name)
      .header("X-Bz-Content-Sha1", checksum)
      .body(object.bytes)
      .send()
      .await
      .map_err(|e| StorageError::Upload(e.to_string()))?;

    let uploaded: UploadedFile = decode(response).await.map_err(StorageError::Upload)?;
    info!(file_id = %uploaded.file_id, name = %uploaded.file_name, "uploaded to B2");

    Ok(StoredObject {
      url: self.download_url(&auth, &uploaded.file_name),
      id: uploaded.file_id,
      name: uploaded.file_name,
    })
  }

  async fn delete(&self, object: &StoredObject) -> Result<(), StorageError> {
    let auth = self
      .authorize()
      .await
      .map_err(|e| StorageError::Delete(e.to_string()))?;
    let url = format!("{}/b2api/v2/b2_delete_file_version", auth.api_url);

    let response = self
      .http
      .post(&url)
      .header(AUTHORIZATION, &auth.authorization_token)
      .json(&json!({ "fileName": object.name, "fileId": object.id }))
      .send()
      .await
      .map_err(|e| StorageError::Delete(e.to_string()))?;

    let _: serde_json::Value = decode(response).await.map_err(StorageError::Delete)?;
    info!(file_id = %object.id, name = %object.name, "deleted from B2");
    Ok(())
  }
}

/// Decode a B2 JSON reply, turning error replies (`{status, code, message}`)
/// into their message.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
  let status = response.status();
  let text = response
    .text()
    .await
    .map_err(|e| format!("failed to read response: {}", e))?;

  if !status.is_success() {
    let message = serde_json::from_str::<serde_json::Value>(&text)
      .ok()
      .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| format!("status {}", status.as_u16()));
    return Err(message);
  }

  serde_json::from_str(&text).map_err(|e| format!("unexpected response: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::extract::State;
  use axum::http::{HeaderMap, StatusCode};
  use axum::routing::{get, post};
  use axum::{Json, Router};
  use serde_json::Value;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct Seen {
    uploads: Arc<Mutex<Vec<(String, String, usize)>>>,
    deletes: Arc<Mutex<Vec<Value>>>,
    base: Arc<Mutex<String>>,
  }

  async fn mock_b2(seen: Seen) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *seen.base.lock().unwrap() = base.clone();

    let router = Router::new()
      .route(
        "/b2api/v2/b2_authorize_account",
        get(|State(seen): State<Seen>, headers: HeaderMap| async move {
          let basic = headers.get("authorization").unwrap().to_str().unwrap().to_string();
          if !basic.starts_with("Basic ") {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "bad auth" })));
          }
          let base = seen.base.lock().unwrap().clone();
          (
            StatusCode::OK,
            Json(json!({
              "authorizationToken": "acct-token",
              "apiUrl": base,
              "downloadUrl": base,
            })),
          )
        }),
      )
      .route(
        "/b2api/v2/b2_get_upload_url",
        post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
          assert_eq!(body["bucketId"], "bucket-1");
          let base = seen.base.lock().unwrap().clone();
          Json(json!({
            "uploadUrl": format!("{}/upload", base),
            "authorizationToken": "upload-token",
          }))
        }),
      )
      .route(
        "/upload",
        post(|State(seen): State<Seen>, headers: HeaderMap, body: axum::body::Bytes| async move {
          let name = headers.get("x-bz-file-name").unwrap().to_str().unwrap().to_string();
          let sha = headers.get("x-bz-content-sha1").unwrap().to_str().unwrap().to_string();
          seen.uploads.lock().unwrap().push((name.clone(), sha, body.len()));
          Json(json!({ "fileId": "file-9", "fileName": name.replace("%2F", "/") }))
        }),
      )
      .route(
        "/b2api/v2/b2_delete_file_version",
        post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
          seen.deletes.lock().unwrap().push(body.clone());
          Json(body)
        }),
      )
      .with_state(seen);

    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    base
  }

  fn bucket() -> BucketConfig {
    BucketConfig {
      account_id: "acct".into(),
      application_key: "key".into(),
      bucket_id: "bucket-1".into(),
      bucket_name: "school-pictures".into(),
    }
  }

  #[test]
  fn test_missing_credentials() {
    let err = B2Store::new("https://api.backblazeb2.com", BucketConfig::default())
      .err()
      .unwrap();
    assert!(matches!(err, StorageError::NotConfigured(_)));
  }

  #[tokio::test]
  async fn test_put_and_delete() {
    let seen = Seen::default();
    let base = mock_b2(seen.clone()).await;
    let store = B2Store::new(&base, bucket()).unwrap();

    let stored = store
      .put(NewObject {
        name: "students/7-1.png".into(),
        content_type: "image/png".into(),
        bytes: b"abc".to_vec(),
      })
      .await
      .unwrap();

    assert_eq!(stored.id, "file-9");
    assert_eq!(stored.name, "students/7-1.png");
    assert_eq!(
      stored.url,
      format!("{}/file/school-pictures/students/7-1.png", base)
    );

    {
      let uploads = seen.uploads.lock().unwrap();
      assert_eq!(uploads.len(), 1);
      // SHA-1 of "abc"
      assert_eq!(uploads[0].1, "a9993e364706816aba3e25717850c26c9cd0d89d");
      assert_eq!(uploads[0].2, 3);
    }

    store.delete(&stored).await.unwrap();
    let deletes = seen.deletes.lock().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0]["fileId"], "file-9");
    assert_eq!(deletes[0]["fileName"], "students/7-1.png");
  }

  #[tokio::test]
  async fn test_b2_error_message_surfaces() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = Router::new().route(
      "/b2api/v2/b2_authorize_account",
      get(|| async {
        (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "status": 401, "code": "bad_auth_token", "message": "Invalid accountId" })),
        )
      }),
    );
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });

    let store = B2Store::new(&base, bucket()).unwrap();
    let err = store
      .put(NewObject {
        name: "x.png".into(),
        content_type: "image/png".into(),
        bytes: vec![1],
      })
      .await
      .unwrap_err();
    assert_eq!(err, StorageError::Authorize("Invalid accountId".into()));
  }
}
