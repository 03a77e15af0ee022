//! Client for the upstream REST backend every proxy route forwards to.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::error::ProxyError;

/// Credentials attached to an upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
  None,
  Bearer(String),
}

/// A successful upstream answer, already unwrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
  pub status: u16,
  pub data: Value,
}

#[derive(Clone)]
pub struct BackendClient {
  http: reqwest::Client,
  base_url: Option<String>,
}

impl BackendClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.backend_timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: config.backend_url().map(String::from),
    })
  }

  fn url(&self, path: &str) -> std::result::Result<String, ProxyError> {
    let base = self
      .base_url
      .as_deref()
      .ok_or_else(|| ProxyError::Config("BACKEND_API_URL is not set".to_string()))?;
    Ok(format!("{}/{}", base, path.trim_start_matches('/')))
  }

  pub async fn get(&self, path: &str, auth: &Auth) -> std::result::Result<Value, ProxyError> {
    self
      .request(Method::GET, path, auth, None)
      .await
      .map(|reply| reply.data)
  }

  /// Forward one call upstream.
  ///
  /// Non-2xx answers become `ProxyError::Upstream` with the same status. A
  /// 2xx body that isn't JSON is `InvalidUpstreamBody`; an empty one is
  /// `null`.
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    auth: &Auth,
    body: Option<&Value>,
  ) -> std::result::Result<UpstreamReply, ProxyError> {
    let url = self.url(path)?;
    info!(%method, path, "upstream request");

    let mut request = self.http.request(method.clone(), &url);
    if let Auth::Bearer(token) = auth {
      request = request.bearer_auth(token);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
      warn!(%method, path, "upstream unreachable: {}", e);
      if e.is_timeout() {
        ProxyError::Transport("request timed out".to_string())
      } else {
        ProxyError::Transport(e.to_string())
      }
    })?;

    let status = response.status().as_u16();
    let text = response
      .text()
      .await
      .map_err(|e| ProxyError::Transport(format!("failed to read response: {}", e)))?;

    if !(200..300).contains(&status) {
      let message = error_message(status, &text);
      warn!(%method, path, status, "upstream error: {}", message);
      return Err(ProxyError::Upstream { status, message });
    }

    if text.trim().is_empty() {
      return Ok(UpstreamReply {
        status,
        data: Value::Null,
      });
    }

    let document: Value = serde_json::from_str(&text).map_err(|e| {
      warn!(%method, path, "upstream sent invalid JSON: {}", e);
      ProxyError::InvalidUpstreamBody
    })?;
    debug!(%method, path, status, "upstream ok");

    Ok(UpstreamReply {
      status,
      data: unwrap_payload(document),
    })
  }
}

/// Human readable message from an upstream error body.
///
/// NestJS-style bodies carry `message` as a string or a list of validation
/// messages; others use `error`. Plain text is used as is.
pub fn error_message(status: u16, body: &str) -> String {
  let fallback = || format!("Upstream request failed with status {}", status);

  let Ok(document) = serde_json::from_str::<Value>(body) else {
    let text = body.trim();
    return if text.is_empty() {
      fallback()
    } else {
      text.chars().take(500).collect()
    };
  };

  match document.get("message") {
    Some(Value::String(message)) if !message.is_empty() => return message.clone(),
    Some(Value::Array(messages)) => {
      let joined: Vec<&str> = messages.iter().filter_map(Value::as_str).collect();
      if !joined.is_empty() {
        return joined.join(", ");
      }
    }
    _ => {}
  }

  document
    .get("error")
    .and_then(Value::as_str)
    .filter(|e| !e.is_empty())
    .map(String::from)
    .unwrap_or_else(fallback)
}

/// The payload of a successful answer: `.data` when the backend wraps it,
/// otherwise the whole document.
pub fn unwrap_payload(document: Value) -> Value {
  match document {
    Value::Object(mut map) if map.contains_key("data") => {
      map.remove("data").unwrap_or(Value::Null)
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_error_message() {
    assert_eq!(
      error_message(400, r#"{"message":["name should not be empty","age must be a number"]}"#),
      "name should not be empty, age must be a number"
    );
    assert_eq!(
      error_message(404, r#"{"statusCode":404,"message":"Student not found"}"#),
      "Student not found"
    );
    assert_eq!(error_message(401, r#"{"error":"Unauthorized"}"#), "Unauthorized");
    assert_eq!(error_message(502, "Bad Gateway"), "Bad Gateway");
    assert_eq!(
      error_message(500, ""),
      "Upstream request failed with status 500"
    );
    assert_eq!(
      error_message(500, "{}"),
      "Upstream request failed with status 500"
    );
  }

  #[test]
  fn test_unwrap_payload() {
    assert_eq!(
      unwrap_payload(json!({ "success": true, "data": [1], "message": "ok" })),
      json!([1])
    );
    assert_eq!(unwrap_payload(json!([1, 2])), json!([1, 2]));
    assert_eq!(unwrap_payload(json!({ "id": "s1" })), json!({ "id": "s1" }));
  }

  #[tokio::test]
  async fn test_missing_backend_url_is_config_error() {
    let client = BackendClient::new(&Config::default()).unwrap();
    let err = client.get("/students", &Auth::None).await.unwrap_err();
    assert!(matches!(err, ProxyError::Config(ref m) if m.contains("BACKEND_API_URL")));
  }
}
