//! Picture uploads: store the image, then point the record at it.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::info;

use crate::server::auth::Caller;
use crate::server::backend::Auth;
use crate::server::error::ProxyError;
use crate::server::{AppState, PictureOwner};
use crate::storage::{image_extension, object_name, upload_then_write, NewObject, SagaError};

use super::{checked_id, relay, ApiResult};

const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
  Router::new()
    .route(
      "/students/:id/picture",
      post(
        |State(state): State<AppState>,
         Caller(auth): Caller,
         Path(id): Path<String>,
         multipart: Multipart| {
          upload_picture(PictureOwner::Student, state, auth, id, multipart)
        },
      ),
    )
    .route(
      "/parents/:id/picture",
      post(
        |State(state): State<AppState>,
         Caller(auth): Caller,
         Path(id): Path<String>,
         multipart: Multipart| {
          upload_picture(PictureOwner::Parent, state, auth, id, multipart)
        },
      ),
    )
    // Leave room for the multipart framing around a maximum size picture
    .layer(DefaultBodyLimit::max(MAX_PICTURE_BYTES + 64 * 1024))
}

struct Picture {
  content_type: String,
  file_name: Option<String>,
  bytes: Vec<u8>,
}

async fn upload_picture(
  owner: PictureOwner,
  state: AppState,
  auth: Auth,
  id: String,
  multipart: Multipart,
) -> ApiResult {
  let id = checked_id(&id)?.to_string();
  let store = state.store(owner)?;
  let picture = read_picture(multipart).await?;

  let extension = image_extension(&picture.content_type, picture.file_name.as_deref());
  let object = NewObject {
    name: object_name(owner.collection(), &id, &extension, Utc::now().timestamp_millis()),
    content_type: picture.content_type,
    bytes: picture.bytes,
  };

  let backend = state.backend.clone();
  let path = format!("/{}/{}", owner.collection(), id);
  let (stored, reply) = upload_then_write(store.as_ref(), object, move |stored| async move {
    let body = json!({ "pictureUrl": stored.url });
    backend.request(Method::PATCH, &path, &auth, Some(&body)).await
  })
  .await
  .map_err(|e| match e {
    SagaError::Upload(e) => ProxyError::Storage(e.to_string()),
    SagaError::Write(e) => e,
  })?;

  info!(owner = owner.collection(), id = %id, url = %stored.url, "picture updated");
  relay(reply)
}

async fn read_picture(mut multipart: Multipart) -> Result<Picture, ProxyError> {
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ProxyError::BadRequest(format!("Invalid upload: {}", e)))?
  {
    if field.name() != Some("file") {
      continue;
    }

    let content_type = field
      .content_type()
      .unwrap_or("application/octet-stream")
      .to_string();
    if !content_type.starts_with("image/") {
      return Err(ProxyError::BadRequest(
        "Only image files can be uploaded".to_string(),
      ));
    }

    let file_name = field.file_name().map(String::from);
    let bytes = field
      .bytes()
      .await
      .map_err(|e| ProxyError::BadRequest(format!("Invalid upload: {}", e)))?;

    if bytes.is_empty() {
      return Err(ProxyError::BadRequest("Uploaded file is empty".to_string()));
    }
    if bytes.len() > MAX_PICTURE_BYTES {
      return Err(ProxyError::BadRequest(
        "Picture must be at most 5 MB".to_string(),
      ));
    }

    return Ok(Picture {
      content_type,
      file_name,
      bytes: bytes.to_vec(),
    });
  }

  Err(ProxyError::BadRequest("No file uploaded".to_string()))
}
