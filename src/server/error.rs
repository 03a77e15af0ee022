//! Errors a proxy route can end in, each mapped to an HTTP status and the
//! error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::school::envelope::ApiResponse;
use crate::school::forms::ValidationErrors;

#[derive(Error, Debug)]
pub enum ProxyError {
  // ---------------------------
  // Local
  // ---------------------------
  #[error("Server misconfigured: {0}")]
  Config(String),

  #[error("{0}")]
  Validation(#[from] ValidationErrors),

  #[error("{0}")]
  BadRequest(String),

  #[error("Not authenticated")]
  Unauthorized,

  // ---------------------------
  // Upstream backend
  // ---------------------------
  #[error("{message}")]
  Upstream { status: u16, message: String },

  #[error("Invalid response from backend")]
  InvalidUpstreamBody,

  #[error("Backend unreachable: {0}")]
  Transport(String),

  // ---------------------------
  // Object storage
  // ---------------------------
  #[error("{0}")]
  Storage(String),
}

impl ProxyError {
  pub fn status(&self) -> StatusCode {
    match self {
      ProxyError::Config(_) | ProxyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ProxyError::Validation(_) | ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
      ProxyError::Upstream { status, .. } => {
        StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
      }
      ProxyError::InvalidUpstreamBody | ProxyError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for ProxyError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(status = status.as_u16(), "{}", self);
    } else {
      warn!(status = status.as_u16(), "{}", self);
    }

    let body = ApiResponse::<()>::err(status.as_u16(), self.to_string());
    (status, Json(body)).into_response()
  }
}
