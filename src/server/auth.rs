//! Who is calling: the session cookie, a bearer header, or the server's own
//! API token.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::backend::Auth;
use super::error::ProxyError;
use super::AppState;

pub const TOKEN_COOKIE: &str = "token";

const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 7;

/// Value of cookie `name`, if the request carries it.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get_all(COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(key, _)| *key == name)
    .map(|(_, value)| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
  headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
}

/// Token for upstream calls: session cookie, then bearer header, then the
/// configured service token.
pub fn resolve_token(headers: &HeaderMap, service_token: Option<&str>) -> Option<String> {
  cookie_value(headers, TOKEN_COOKIE)
    .or_else(|| bearer_token(headers))
    .or_else(|| service_token.filter(|t| !t.is_empty()).map(String::from))
}

/// `Set-Cookie` value for a fresh session.
pub fn session_cookie(token: &str) -> String {
  format!(
    "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
    TOKEN_COOKIE, token, SESSION_MAX_AGE_SECS
  )
}

/// `Set-Cookie` value that ends the session.
pub fn cleared_cookie() -> String {
  format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", TOKEN_COOKIE)
}

/// An authenticated caller. Rejects the request with 401 when no token can
/// be found.
pub struct Caller(pub Auth);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
  type Rejection = ProxyError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    resolve_token(&parts.headers, state.config.backend.api_token.as_deref())
      .map(|token| Caller(Auth::Bearer(token)))
      .ok_or(ProxyError::Unauthorized)
  }
}
