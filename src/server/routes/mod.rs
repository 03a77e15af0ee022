mod attendance;
mod auth;
mod dashboard;
mod qrcodes;
mod resources;
mod uploads;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::school::envelope::ApiResponse;
use crate::school::forms::Validate;

use super::backend::UpstreamReply;
use super::error::ProxyError;
use super::AppState;

pub type ApiResult = Result<(StatusCode, Json<ApiResponse<Value>>), ProxyError>;

/// Everything under `/api`.
pub fn api() -> Router<AppState> {
  Router::new()
    .merge(resources::routes(&resources::STUDENTS))
    .merge(resources::routes(&resources::CLASSES))
    .merge(resources::routes(&resources::PARENTS))
    .merge(resources::routes(&resources::USERS))
    .merge(resources::routes(&resources::ATTENDANCE))
    .merge(attendance::routes())
    .merge(dashboard::routes())
    .merge(qrcodes::routes())
    .merge(auth::routes())
    .merge(uploads::routes())
}

/// Relay a successful upstream answer. `204` has no body upstream but the
/// envelope always has one.
fn relay(reply: UpstreamReply) -> ApiResult {
  let status = match reply.status {
    204 => StatusCode::OK,
    other => StatusCode::from_u16(other).unwrap_or(StatusCode::OK),
  };
  Ok((status, Json(ApiResponse::ok(reply.data))))
}

fn created(data: Value) -> ApiResult {
  Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

/// Parse a JSON request body; an empty body is an empty object.
fn parse_body(body: &Bytes) -> Result<Value, ProxyError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Object(Default::default()));
  }
  serde_json::from_slice(body)
    .map_err(|e| ProxyError::BadRequest(format!("Request body must be valid JSON: {}", e)))
}

/// Check a body against `F`'s schema, then decode it. Fields the form
/// doesn't declare are dropped here and never reach the backend.
fn parse_form<F: Validate + DeserializeOwned>(body: &Bytes) -> Result<F, ProxyError> {
  let body = parse_body(body)?;
  F::schema().validate(&body)?;
  serde_json::from_value(body)
    .map_err(|e| ProxyError::BadRequest(format!("Invalid request body: {}", e)))
}

fn form_body<F: Serialize>(form: &F) -> Value {
  serde_json::to_value(form).unwrap_or(Value::Null)
}

/// Ids are spliced into upstream paths, so only plain tokens get through.
fn checked_id(id: &str) -> Result<&str, ProxyError> {
  let valid = !id.is_empty()
    && id.len() <= 64
    && id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if valid {
    Ok(id)
  } else {
    Err(ProxyError::BadRequest(format!("Invalid id: {}", id)))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_checked_id() {
    assert!(checked_id("clx12ab-9_z").is_ok());
    assert!(checked_id("42").is_ok());
    assert!(checked_id("").is_err());
    assert!(checked_id("../users").is_err());
    assert!(checked_id("a b").is_err());
  }

  #[test]
  fn test_parse_body() {
    assert_eq!(parse_body(&Bytes::from_static(b"  ")).unwrap(), serde_json::json!({}));
    assert!(matches!(
      parse_body(&Bytes::from_static(b"{nope")),
      Err(ProxyError::BadRequest(_))
    ));
  }
}
