//! School records as the upstream backend serves them.
//!
//! Field names follow the backend's camelCase JSON. Everything except the id is
//! defaulted so partially populated records (list endpoints omit relations)
//! still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Upstream ids arrive as strings or numbers depending on the table.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
  Text(String),
  Number(i64),
}

impl From<RawId> for String {
  fn from(id: RawId) -> Self {
    match id {
      RawId::Text(s) => s,
      RawId::Number(n) => n.to_string(),
    }
  }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

/// A reference the backend sometimes sends as `null`; empty when missing.
fn nullable_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  Ok(opt_id_string(deserializer)?.unwrap_or_default())
}

/// Number that may arrive quoted. Unparsable text counts as missing.
fn opt_lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
  Ok(match Option::<RawId>::deserialize(deserializer)? {
    Some(RawId::Number(n)) => i32::try_from(n).ok(),
    Some(RawId::Text(s)) => s.trim().parse().ok(),
    None => None,
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
  #[default]
  Admin,
  Security,
}

impl Role {
  pub const ALL: &'static [&'static str] = &["ADMIN", "SECURITY"];
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Role::Admin => write!(f, "ADMIN"),
      Role::Security => write!(f, "SECURITY"),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub role: Role,
}

/// Minimal reference to a student embedded in other records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRef {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassRef {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub age: Option<u32>,
  #[serde(default, deserialize_with = "opt_id_string")]
  pub class_id: Option<String>,
  #[serde(default, deserialize_with = "opt_id_string")]
  pub parent_id: Option<String>,
  #[serde(default)]
  pub picture_url: Option<String>,
  #[serde(default)]
  pub class: Option<ClassRef>,
  #[serde(default)]
  pub parent: Option<ParentRef>,
  // Derived counts, computed by the backend
  #[serde(default)]
  pub attendance_count: u32,
  #[serde(default)]
  pub absence_count: u32,
  #[serde(default)]
  pub late_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub students: Vec<StudentRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub phone: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub picture_url: Option<String>,
  #[serde(default)]
  pub students: Vec<StudentRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default, deserialize_with = "nullable_id_string")]
  pub student_id: String,
  #[serde(default, deserialize_with = "opt_id_string")]
  pub class_id: Option<String>,
  #[serde(default)]
  pub check_in_time: Option<DateTime<Utc>>,
  #[serde(default)]
  pub check_out_time: Option<DateTime<Utc>>,
  /// Weekday name or day of month, depending on the backend version
  #[serde(default, deserialize_with = "opt_id_string")]
  pub day: Option<String>,
  #[serde(default, deserialize_with = "opt_lenient_i32")]
  pub year: Option<i32>,
  #[serde(default)]
  pub student: Option<StudentRef>,
  #[serde(default)]
  pub class: Option<ClassRef>,
}

impl Attendance {
  /// Display name of the student, falling back to the id
  pub fn student_name(&self) -> &str {
    self
      .student
      .as_ref()
      .map(|s| s.name.as_str())
      .filter(|n| !n.is_empty())
      .unwrap_or(&self.student_id)
  }
}

/// Per-student QR code used for card generation and check-in scanning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
  #[serde(default, deserialize_with = "id_string")]
  pub id: String,
  #[serde(default, deserialize_with = "id_string")]
  pub student_id: String,
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub valid_from: Option<DateTime<Utc>>,
  #[serde(default)]
  pub valid_until: Option<DateTime<Utc>>,
}

/// Aggregate served by `/api/dashboard`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
  pub total_students: usize,
  pub total_classes: usize,
  pub total_parents: usize,
  pub total_users: usize,
  pub attendance_today: usize,
  #[serde(default)]
  pub recent_attendance: Vec<Attendance>,
}
