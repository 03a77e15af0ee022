//! Object storage for student and parent pictures.

mod b2;
mod saga;

use async_trait::async_trait;
use thiserror::Error;

pub use b2::B2Store;
pub use saga::{upload_then_write, SagaError};

/// An object about to be uploaded.
#[derive(Debug, Clone)]
pub struct NewObject {
  pub name: String,
  pub content_type: String,
  pub bytes: Vec<u8>,
}

/// An object the store has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
  /// Provider file id, needed to delete this exact version
  pub id: String,
  pub name: String,
  /// Public download URL
  pub url: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
  #[error("Storage is not configured: missing {0}")]
  NotConfigured(String),

  #[error("Storage authorization failed: {0}")]
  Authorize(String),

  #[error("Could not get an upload URL: {0}")]
  UploadUrl(String),

  #[error("Upload failed: {0}")]
  Upload(String),

  #[error("Delete failed: {0}")]
  Delete(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
  async fn put(&self, object: NewObject) -> Result<StoredObject, StorageError>;

  async fn delete(&self, object: &StoredObject) -> Result<(), StorageError>;
}

/// `<prefix>/<owner id>-<unix millis>.<ext>`
pub fn object_name(prefix: &str, owner_id: &str, extension: &str, millis: i64) -> String {
  format!("{}/{}-{}.{}", prefix, owner_id, millis, extension)
}

/// File extension for an image content type, falling back to the upload's
/// file name.
pub fn image_extension(content_type: &str, file_name: Option<&str>) -> String {
  let from_type = match content_type {
    "image/jpeg" | "image/jpg" => Some("jpg"),
    "image/png" => Some("png"),
    "image/gif" => Some("gif"),
    "image/webp" => Some("webp"),
    "image/svg+xml" => Some("svg"),
    _ => None,
  };
  if let Some(ext) = from_type {
    return ext.to_string();
  }

  file_name
    .and_then(|name| name.rsplit_once('.'))
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .unwrap_or_else(|| "bin".to_string())
}
