//! `GET /api/dashboard`: totals and today's attendance, built from the five
//! upstream collections.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use crate::school::envelope::ApiResponse;
use crate::school::types::{Attendance, DashboardStats};
use crate::server::auth::Caller;
use crate::server::error::ProxyError;
use crate::server::AppState;

use super::ApiResult;

const RECENT_LIMIT: usize = 5;

pub fn routes() -> Router<AppState> {
  Router::new().route("/dashboard", get(dashboard))
}

async fn dashboard(State(state): State<AppState>, Caller(auth): Caller) -> ApiResult {
  let backend = &state.backend;
  let (students, classes, parents, users, attendance) = futures::try_join!(
    backend.get("/students", &auth),
    backend.get("/classes", &auth),
    backend.get("/parents", &auth),
    backend.get("/users", &auth),
    backend.get("/attendance", &auth),
  )?;

  let stats = summarize(
    count(&students)?,
    count(&classes)?,
    count(&parents)?,
    count(&users)?,
    attendance_records(attendance)?,
    Utc::now().date_naive(),
  );

  let data = serde_json::to_value(stats).map_err(|_| ProxyError::InvalidUpstreamBody)?;
  Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
}

fn count(list: &Value) -> Result<usize, ProxyError> {
  list
    .as_array()
    .map(Vec::len)
    .ok_or(ProxyError::InvalidUpstreamBody)
}

/// Decode attendance one record at a time so a single odd row can't take
/// the whole dashboard down.
fn attendance_records(list: Value) -> Result<Vec<Attendance>, ProxyError> {
  let Value::Array(items) = list else {
    return Err(ProxyError::InvalidUpstreamBody);
  };
  Ok(
    items
      .into_iter()
      .filter_map(|item| match serde_json::from_value::<Attendance>(item) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!("skipping attendance record: {}", e);
          None
        }
      })
      .collect(),
  )
}

/// Totals plus attendance for `today` (a UTC date) and the latest check-ins,
/// newest first.
pub fn summarize(
  total_students: usize,
  total_classes: usize,
  total_parents: usize,
  total_users: usize,
  mut attendance: Vec<Attendance>,
  today: NaiveDate,
) -> DashboardStats {
  let attendance_today = attendance
    .iter()
    .filter(|a| a.check_in_time.map(|t| t.date_naive()) == Some(today))
    .count();

  attendance.retain(|a| a.check_in_time.is_some());
  attendance.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));
  attendance.truncate(RECENT_LIMIT);

  DashboardStats {
    total_students,
    total_classes,
    total_parents,
    total_users,
    attendance_today,
    recent_attendance: attendance,
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::{call, json_request, spawn_upstream, state_for};
  use super::*;
  use axum::routing::get;
  use chrono::{DateTime, TimeZone};
  use serde_json::json;

  fn checked_in(id: &str, at: DateTime<Utc>) -> Attendance {
    Attendance {
      id: id.to_string(),
      check_in_time: Some(at),
      ..Default::default()
    }
  }

  #[test]
  fn test_attendance_today_uses_utc_date() {
    let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
    let records = vec![
      checked_in("a", Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap()),
      checked_in("b", Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 59).unwrap()),
      // Still the 13th in UTC even though it's the 14th further east
      checked_in("c", Utc.with_ymd_and_hms(2024, 3, 13, 23, 30, 0).unwrap()),
      Attendance {
        id: "d".into(),
        ..Default::default()
      },
    ];

    let stats = summarize(3, 2, 1, 1, records, today);
    assert_eq!(stats.attendance_today, 2);
    assert_eq!(stats.total_students, 3);
  }

  #[test]
  fn test_recent_is_newest_first_and_capped() {
    let records: Vec<Attendance> = (0..8)
      .map(|h| checked_in(&h.to_string(), Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()))
      .collect();

    let stats = summarize(0, 0, 0, 0, records, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    let ids: Vec<&str> = stats.recent_attendance.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["7", "6", "5", "4", "3"]);
    assert_eq!(stats.attendance_today, 0);
  }

  #[tokio::test]
  async fn test_dashboard_route() {
    let now = Utc::now().to_rfc3339();
    let upstream = spawn_upstream(
      axum::Router::new()
        .route("/students", get(|| async { Json(json!([{ "id": 1 }, { "id": 2 }])) }))
        .route("/classes", get(|| async { Json(json!({ "data": [{ "id": 1 }] })) }))
        .route("/parents", get(|| async { Json(json!([])) }))
        .route("/users", get(|| async { Json(json!([{ "id": "u" }])) }))
        .route(
          "/attendance",
          get(move || {
            let now = now.clone();
            async move { Json(json!([{ "id": "a1", "studentId": "1", "checkInTime": now }])) }
          }),
        ),
    )
    .await;

    let (status, body, _) = call(state_for(&upstream), json_request("GET", "/api/dashboard", None)).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["totalStudents"], 2);
    assert_eq!(data["totalClasses"], 1);
    assert_eq!(data["totalParents"], 0);
    assert_eq!(data["totalUsers"], 1);
    assert_eq!(data["attendanceToday"], 1);
    assert_eq!(data["recentAttendance"][0]["id"], "a1");
  }

  #[tokio::test]
  async fn test_odd_attendance_rows_do_not_fail_dashboard() {
    let now = Utc::now().to_rfc3339();
    let upstream = spawn_upstream(
      axum::Router::new()
        .route("/students", get(|| async { Json(json!([{ "id": 2 }])) }))
        .route("/classes", get(|| async { Json(json!([])) }))
        .route("/parents", get(|| async { Json(json!([])) }))
        .route("/users", get(|| async { Json(json!([])) }))
        .route(
          "/attendance",
          get(move || {
            let now = now.clone();
            async move {
              Json(json!([
                { "id": 1, "studentId": 2, "day": 14, "year": 2024, "checkInTime": now },
                { "id": 2, "studentId": null, "year": "2024", "checkInTime": now },
                // Not a timestamp; skipped rather than failing the aggregate
                { "id": 3, "studentId": 2, "checkInTime": "yesterday" }
              ]))
            }
          }),
        ),
    )
    .await;

    let (status, body, _) = call(state_for(&upstream), json_request("GET", "/api/dashboard", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attendanceToday"], 2);
    assert_eq!(body["data"]["recentAttendance"].as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_one_failed_collection_fails_dashboard() {
    let upstream = spawn_upstream(
      axum::Router::new()
        .route("/students", get(|| async { Json(json!([])) }))
        .route("/classes", get(|| async { Json(json!([])) }))
        .route("/parents", get(|| async { Json(json!([])) }))
        .route(
          "/users",
          get(|| async { (StatusCode::FORBIDDEN, Json(json!({ "message": "Forbidden resource" }))) }),
        )
        .route("/attendance", get(|| async { Json(json!([])) })),
    )
    .await;

    let (status, body, _) = call(state_for(&upstream), json_request("GET", "/api/dashboard", None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden resource");
  }
}
