//! `/api/auth/*`. Sign-in turns the backend's access token into an HTTP-only
//! session cookie so the token never reaches page scripts.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Method;
use serde_json::Value;
use tracing::info;

use crate::school::envelope::ApiResponse;
use crate::school::forms::{self, RegisterForm, ResetPasswordForm, Schema, SignInForm};
use crate::server::auth::{cleared_cookie, session_cookie, Caller};
use crate::server::backend::Auth;
use crate::server::error::ProxyError;
use crate::server::AppState;

use super::{created, form_body, parse_body, parse_form, relay, ApiResult};

const TOKEN_FIELDS: [&str; 3] = ["accessToken", "access_token", "token"];

pub fn routes() -> Router<AppState> {
  Router::new()
    .route("/auth/signin", post(sign_in))
    .route("/auth/signout", post(sign_out))
    .route("/auth/register", post(register))
    .route("/auth/me", get(me))
    .route(
      "/auth/forgot-password",
      post(|State(state): State<AppState>, body: Bytes| {
        forward_public(state, "/auth/forgot-password", &forms::FORGOT_PASSWORD, body)
      }),
    )
    .route("/auth/reset-password", post(reset_password))
    .route(
      "/auth/verify-email",
      post(|State(state): State<AppState>, body: Bytes| {
        forward_public(state, "/auth/verify-email", &forms::VERIFY_EMAIL, body)
      }),
    )
}

async fn sign_in(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
  let form: SignInForm = parse_form(&body)?;
  let body = form_body(&form);

  let reply = state
    .backend
    .request(Method::POST, "/auth/signin", &Auth::None, Some(&body))
    .await?;
  let (token, profile) = take_token(reply.data).ok_or(ProxyError::InvalidUpstreamBody)?;
  info!("session started");

  Ok(
    (
      StatusCode::OK,
      [(SET_COOKIE, session_cookie(&token))],
      Json(ApiResponse::ok(profile)),
    )
      .into_response(),
  )
}

async fn sign_out() -> Response {
  (
    StatusCode::OK,
    [(SET_COOKIE, cleared_cookie())],
    Json(ApiResponse::ok(Value::Null)),
  )
    .into_response()
}

async fn register(State(state): State<AppState>, body: Bytes) -> ApiResult {
  let form: RegisterForm = parse_form(&body)?;
  let body = form_body(&form);

  let reply = state
    .backend
    .request(Method::POST, "/auth/register", &Auth::None, Some(&body))
    .await?;
  let profile = match take_token(reply.data.clone()) {
    Some((_, profile)) => profile,
    None => reply.data,
  };
  created(profile)
}

async fn reset_password(State(state): State<AppState>, body: Bytes) -> ApiResult {
  let form: ResetPasswordForm = parse_form(&body)?;
  let body = form_body(&form);
  relay(
    state
      .backend
      .request(Method::POST, "/auth/reset-password", &Auth::None, Some(&body))
      .await?,
  )
}

async fn me(State(state): State<AppState>, Caller(auth): Caller) -> ApiResult {
  relay(
    state
      .backend
      .request(Method::GET, "/auth/me", &auth, None)
      .await?,
  )
}

async fn forward_public(
  state: AppState,
  path: &'static str,
  schema: &'static Schema,
  body: Bytes,
) -> ApiResult {
  let body = parse_body(&body)?;
  schema.validate(&body)?;
  relay(
    state
      .backend
      .request(Method::POST, path, &Auth::None, Some(&body))
      .await?,
  )
}

/// Split the access token out of a sign-in payload. Every token field is
/// removed; the first string one wins.
fn take_token(mut data: Value) -> Option<(String, Value)> {
  let map = data.as_object_mut()?;
  let mut token = None;
  for field in TOKEN_FIELDS {
    if let Some(Value::String(value)) = map.remove(field) {
      if token.is_none() && !value.is_empty() {
        token = Some(value);
      }
    }
  }
  token.map(|token| (token, data))
}

#[cfg(test)]
mod tests {
  use super::super::testing::{call, config_for, json_request, spawn_upstream, state_for};
  use super::*;
  use axum::http::HeaderMap;
  use serde_json::json;

  #[test]
  fn test_take_token() {
    let (token, rest) =
      take_token(json!({ "accessToken": "jwt", "user": { "id": "u1" } })).unwrap();
    assert_eq!(token, "jwt");
    assert_eq!(rest, json!({ "user": { "id": "u1" } }));

    assert!(take_token(json!({ "user": {} })).is_none());
    assert!(take_token(json!([1])).is_none());
  }

  #[tokio::test]
  async fn test_sign_in_sets_cookie_and_hides_token() {
    let upstream = spawn_upstream(Router::new().route(
      "/auth/signin",
      post(|headers: HeaderMap| async move {
        // Sign-in must not forward any credentials
        assert!(headers.get("authorization").is_none());
        (
          StatusCode::CREATED,
          Json(json!({ "accessToken": "jwt-1", "user": { "id": "u1", "role": "ADMIN" } })),
        )
      }),
    ))
    .await;

    let (status, body, headers) = call(
      state_for(&upstream),
      json_request(
        "POST",
        "/api/auth/signin",
        Some(json!({ "email": "admin@school.test", "password": "secret123" })),
      ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("token=jwt-1;"));
    assert!(cookie.contains("HttpOnly"));
    assert_eq!(body["data"]["user"]["id"], "u1");
    assert!(body["data"].get("accessToken").is_none());
  }

  #[tokio::test]
  async fn test_sign_in_rejects_bad_email() {
    let upstream = spawn_upstream(Router::new()).await;

    let (status, body, _) = call(
      state_for(&upstream),
      json_request(
        "POST",
        "/api/auth/signin",
        Some(json!({ "email": "not-an-email", "password": "x" })),
      ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Email"));
  }

  #[tokio::test]
  async fn test_register_forwards_only_form_fields() {
    let upstream = spawn_upstream(Router::new().route(
      "/auth/register",
      post(|Json(body): Json<Value>| async move { (StatusCode::CREATED, Json(body)) }),
    ))
    .await;

    let (status, body, _) = call(
      state_for(&upstream),
      json_request(
        "POST",
        "/api/auth/register",
        Some(json!({
          "name": "Sam",
          "email": "sam@school.test",
          "password": "secret123",
          "role": "SECURITY",
          "isVerified": true
        })),
      ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
      body["data"],
      json!({
        "name": "Sam",
        "email": "sam@school.test",
        "password": "secret123",
        "role": "SECURITY"
      })
    );
  }

  #[tokio::test]
  async fn test_me_uses_cookie_token() {
    let upstream = spawn_upstream(Router::new().route(
      "/auth/me",
      get(|headers: HeaderMap| async move {
        let auth = headers.get("authorization").unwrap().to_str().unwrap().to_string();
        Json(json!({ "id": "u1", "auth": auth }))
      }),
    ))
    .await;

    let mut request = json_request("GET", "/api/auth/me", None);
    request
      .headers_mut()
      .insert("cookie", "token=from-cookie".parse().unwrap());
    let mut config = config_for(&upstream);
    config.backend.api_token = None;

    let (status, body, _) = call(AppState::new(config).unwrap(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["auth"], "Bearer from-cookie");
  }

  #[tokio::test]
  async fn test_sign_out_clears_cookie() {
    let (status, _, headers) = call(
      state_for("http://127.0.0.1:9"),
      json_request("POST", "/api/auth/signout", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
  }
}
