use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;

use crate::server::auth::Caller;
use crate::server::AppState;

use super::{checked_id, relay, ApiResult};

/// Attendance filtered by student or class. The plain collection routes live
/// with the other resources.
pub fn routes() -> Router<AppState> {
  Router::new()
    .route("/attendance/student/:id", get(by_student))
    .route("/attendance/class/:id", get(by_class))
}

async fn by_student(
  State(state): State<AppState>,
  Caller(auth): Caller,
  Path(id): Path<String>,
) -> ApiResult {
  let path = format!("/attendance/student/{}", checked_id(&id)?);
  relay(state.backend.request(reqwest::Method::GET, &path, &auth, None).await?)
}

async fn by_class(
  State(state): State<AppState>,
  Caller(auth): Caller,
  Path(id): Path<String>,
) -> ApiResult {
  let path = format!("/attendance/class/{}", checked_id(&id)?);
  relay(state.backend.request(reqwest::Method::GET, &path, &auth, None).await?)
}
