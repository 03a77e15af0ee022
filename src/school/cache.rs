//! Caching implementations for school records.

use crate::cache::Cacheable;

use super::types::{Attendance, Class, Parent, QrCode, Student, User};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Student {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "student"
  }
}

impl Cacheable for Class {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "class"
  }
}

impl Cacheable for Parent {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "parent"
  }
}

impl Cacheable for User {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "user"
  }
}

impl Cacheable for Attendance {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "attendance"
  }
}

impl Cacheable for QrCode {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "qrcode"
  }
}

// ============================================================================
// Resource keys
// ============================================================================

/// Own-API resources the dashboards read.
///
/// The cache key is the full URL (`base + path`), so two clients pointed at
/// different services never share entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKey {
  Dashboard,
  Students,
  Classes,
  Parents,
  Users,
  Attendance,
  AttendanceByStudent { id: String },
  AttendanceByClass { id: String },
  StudentQrCodes,
}

impl ResourceKey {
  /// Path under the API base, starting with `/`
  pub fn path(&self) -> String {
    match self {
      Self::Dashboard => "/dashboard".to_string(),
      Self::Students => "/students".to_string(),
      Self::Classes => "/classes".to_string(),
      Self::Parents => "/parents".to_string(),
      Self::Users => "/users".to_string(),
      Self::Attendance => "/attendance".to_string(),
      Self::AttendanceByStudent { id } => format!("/attendance/student/{}", id),
      Self::AttendanceByClass { id } => format!("/attendance/class/{}", id),
      Self::StudentQrCodes => "/qrcodes/students".to_string(),
    }
  }

  pub fn url(&self, base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), self.path())
  }

  /// Human readable description for logs
  pub fn description(&self) -> String {
    match self {
      Self::Dashboard => "dashboard summary".to_string(),
      Self::Students => "all students".to_string(),
      Self::Classes => "all classes".to_string(),
      Self::Parents => "all parents".to_string(),
      Self::Users => "all users".to_string(),
      Self::Attendance => "all attendance".to_string(),
      Self::AttendanceByStudent { id } => format!("attendance for student {}", id),
      Self::AttendanceByClass { id } => format!("attendance for class {}", id),
      Self::StudentQrCodes => "student QR codes".to_string(),
    }
  }

  /// Keys whose cached data changes when this resource is written.
  ///
  /// The dashboard aggregates every collection, and attendance feeds the
  /// derived counts on students.
  pub fn dependents(&self) -> Vec<ResourceKey> {
    let mut keys = vec![self.clone()];
    match self {
      Self::Attendance | Self::AttendanceByStudent { .. } | Self::AttendanceByClass { .. } => {
        keys.push(Self::Attendance);
        keys.push(Self::Students);
      }
      _ => {}
    }
    if *self != Self::Dashboard {
      keys.push(Self::Dashboard);
    }
    keys.dedup();
    keys
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_urls() {
    assert_eq!(
      ResourceKey::AttendanceByClass { id: "c1".into() }.url("http://localhost:3000/api/"),
      "http://localhost:3000/api/attendance/class/c1"
    );
    assert_eq!(
      ResourceKey::StudentQrCodes.url("http://localhost:3000/api"),
      "http://localhost:3000/api/qrcodes/students"
    );
  }

  #[test]
  fn test_dependents_include_dashboard() {
    assert_eq!(
      ResourceKey::Classes.dependents(),
      vec![ResourceKey::Classes, ResourceKey::Dashboard]
    );
    assert_eq!(
      ResourceKey::Attendance.dependents(),
      vec![
        ResourceKey::Attendance,
        ResourceKey::Students,
        ResourceKey::Dashboard
      ]
    );
    assert_eq!(ResourceKey::Dashboard.dependents(), vec![ResourceKey::Dashboard]);
  }
}
