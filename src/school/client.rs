use color_eyre::{eyre::eyre, Result};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::cache::FetchError;

/// HTTP client for the own API (`/api/...`).
///
/// Every response is the `{success, data, error}` envelope; callers only ever
/// see `data` or a `FetchError` carrying the status and `error` text.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      token,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Absolute URL for a path under the API base
  pub fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  /// GET a URL and return the unwrapped payload.
  pub async fn get_json(&self, url: &str) -> std::result::Result<Value, FetchError> {
    self.send(Method::GET, url, None::<&Value>).await
  }

  pub async fn delete(&self, path: &str) -> std::result::Result<Value, FetchError> {
    self.send(Method::DELETE, &self.url(path), None::<&Value>).await
  }

  pub async fn send<B: Serialize>(
    &self,
    method: Method,
    url: &str,
    body: Option<&B>,
  ) -> std::result::Result<Value, FetchError> {
    debug!(%method, url, "api request");

    let mut request = self.http.request(method, url);
    if let Some(token) = &self.token {
      request = request.header(COOKIE, format!("token={}", token));
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request
      .send()
      .await
      .map_err(|e| FetchError::new(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    let is_json = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.contains("json"))
      .unwrap_or(false);
    let bytes = response
      .bytes()
      .await
      .map_err(|e| FetchError::new(format!("Failed to read response from {}: {}", url, e)))?;

    let parsed: Option<Value> = if bytes.is_empty() {
      None
    } else {
      serde_json::from_slice(&bytes).ok()
    };

    if !status.is_success() {
      let message = parsed
        .as_ref()
        .and_then(envelope_error)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
      return Err(FetchError::with_status(status.as_u16(), message, parsed));
    }

    match parsed {
      Some(document) => unwrap_envelope(status.as_u16(), document),
      None if bytes.is_empty() => Ok(Value::Null),
      None if is_json => Err(FetchError::with_status(
        status.as_u16(),
        "Invalid JSON in response",
        None,
      )),
      None => Err(FetchError::with_status(
        status.as_u16(),
        "Expected a JSON response",
        None,
      )),
    }
  }
}

fn envelope_error(document: &Value) -> Option<String> {
  document
    .get("error")
    .or_else(|| document.get("message"))
    .and_then(Value::as_str)
    .map(String::from)
}

/// Unwrap `{success, data}`; anything that isn't an envelope is the payload.
fn unwrap_envelope(status: u16, document: Value) -> std::result::Result<Value, FetchError> {
  let Value::Object(mut map) = document else {
    return Ok(document);
  };

  match map.get("success").and_then(Value::as_bool) {
    Some(true) => Ok(map.remove("data").unwrap_or(Value::Null)),
    Some(false) => {
      let document = Value::Object(map);
      let message = envelope_error(&document).unwrap_or_else(|| "Request failed".to_string());
      Err(FetchError::with_status(status, message, Some(document)))
    }
    None => Ok(Value::Object(map)),
  }
}
