use axum::extract::State;
use axum::routing::get;
use axum::Router;
use reqwest::Method;

use crate::server::auth::Caller;
use crate::server::AppState;

use super::{relay, ApiResult};

pub fn routes() -> Router<AppState> {
  Router::new().route("/qrcodes/students", get(student_codes))
}

/// QR codes for every student, for printing ID cards.
async fn student_codes(State(state): State<AppState>, Caller(auth): Caller) -> ApiResult {
  relay(
    state
      .backend
      .request(Method::GET, "/qrCodes/students/qrcode", &auth, None)
      .await?,
  )
}

#[cfg(test)]
mod tests {
  use super::super::testing::{call, json_request, spawn_upstream, state_for};
  use axum::http::StatusCode;
  use axum::routing::get;
  use axum::{Json, Router};
  use serde_json::json;

  #[tokio::test]
  async fn test_maps_to_upstream_path() {
    let upstream = spawn_upstream(Router::new().route(
      "/qrCodes/students/qrcode",
      get(|| async { Json(json!([{ "id": "q1", "studentId": "s1", "code": "XYZ" }])) }),
    ))
    .await;

    let (status, body, _) = call(
      state_for(&upstream),
      json_request("GET", "/api/qrcodes/students", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["code"], "XYZ");
  }
}
