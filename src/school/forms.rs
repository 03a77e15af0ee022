//! Form schemas shared by the dashboard client and the proxy routes.
//!
//! A `Schema` lists the fields a form sends and the rule each one must pass.
//! The client runs it before issuing any request; the server runs it again on
//! the raw JSON body before forwarding upstream, so both sides report the same
//! messages ("Name is required", ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::types::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field: &'static str,
  pub message: String,
}

/// Every field that failed validation, in schema order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
  pub fn single(field: &'static str, message: impl Into<String>) -> Self {
    Self(vec![FieldError {
      field,
      message: message.into(),
    }])
  }

  pub fn errors(&self) -> &[FieldError] {
    &self.0
  }

  /// First message reported for `field`
  pub fn field(&self, field: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|e| e.field == field)
      .map(|e| e.message.as_str())
  }

  fn push(&mut self, field: &'static str, message: String) {
    self.0.push(FieldError { field, message });
  }

  fn into_result(self) -> Result<(), Self> {
    if self.0.is_empty() {
      Ok(())
    } else {
      Err(self)
    }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
    write!(f, "{}", messages.join("; "))
  }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Clone, Copy)]
pub enum Rule {
  /// Trimmed length in characters
  Text { min: usize, max: usize },
  Email,
  /// 7-15 digits, optional leading `+`, spaces, dashes and parentheses
  Phone,
  Integer { min: i64, max: i64 },
  /// At least 8 characters
  Password,
  OneOf(&'static [&'static str]),
  /// RFC 3339 timestamp
  Timestamp,
  /// Record reference, string or number
  Id,
  IdList,
}

impl Rule {
  fn check(&self, label: &str, value: &Value, required: bool) -> Result<(), String> {
    match self {
      Rule::Text { min, max } => {
        let text = as_text(label, value)?;
        if text.is_empty() {
          return blank(label, required);
        }
        let len = text.chars().count();
        if len < *min {
          return Err(format!("{} must be at least {} characters", label, min));
        }
        if len > *max {
          return Err(format!("{} must be at most {} characters", label, max));
        }
        Ok(())
      }
      Rule::Email => {
        let text = as_text(label, value)?;
        if text.is_empty() {
          return blank(label, required);
        }
        if is_email(text) {
          Ok(())
        } else {
          Err(format!("{} must be a valid email address", label))
        }
      }
      Rule::Phone => {
        let text = as_text(label, value)?;
        if text.is_empty() {
          return blank(label, required);
        }
        if is_phone(text) {
          Ok(())
        } else {
          Err(format!("{} must be a valid phone number", label))
        }
      }
      Rule::Integer { min, max } => {
        let number = match value {
          Value::Number(n) => n.as_i64(),
          Value::String(s) if s.trim().is_empty() => return blank(label, required),
          Value::String(s) => s.trim().parse::<i64>().ok(),
          _ => None,
        }
        .ok_or_else(|| format!("{} must be a whole number", label))?;
        if number < *min || number > *max {
          return Err(format!("{} must be between {} and {}", label, min, max));
        }
        Ok(())
      }
      Rule::Password => {
        let text = value
          .as_str()
          .ok_or_else(|| format!("{} must be a string", label))?;
        if text.is_empty() {
          return blank(label, required);
        }
        if text.chars().count() < 8 {
          return Err(format!("{} must be at least 8 characters", label));
        }
        Ok(())
      }
      Rule::OneOf(allowed) => {
        let text = as_text(label, value)?;
        if text.is_empty() {
          return blank(label, required);
        }
        if allowed.contains(&text) {
          Ok(())
        } else {
          Err(format!("{} must be one of {}", label, allowed.join(", ")))
        }
      }
      Rule::Timestamp => {
        let text = as_text(label, value)?;
        if text.is_empty() {
          return blank(label, required);
        }
        DateTime::parse_from_rfc3339(text)
          .map(|_| ())
          .map_err(|_| format!("{} must be a valid date and time", label))
      }
      Rule::Id => match value {
        Value::Number(_) => Ok(()),
        Value::String(s) if s.trim().is_empty() => blank(label, required),
        Value::String(_) => Ok(()),
        _ => Err(format!("{} must be an id", label)),
      },
      Rule::IdList => match value {
        Value::Array(items) if items.iter().all(|i| i.is_string() || i.is_number()) => Ok(()),
        _ => Err(format!("{} must be a list of ids", label)),
      },
    }
  }
}

fn as_text<'a>(label: &str, value: &'a Value) -> Result<&'a str, String> {
  value
    .as_str()
    .map(str::trim)
    .ok_or_else(|| format!("{} must be a string", label))
}

fn blank(label: &str, required: bool) -> Result<(), String> {
  if required {
    Err(format!("{} is required", label))
  } else {
    Ok(())
  }
}

fn is_email(text: &str) -> bool {
  let mut parts = text.split('@');
  let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
    return false;
  };
  !local.is_empty()
    && !text.contains(char::is_whitespace)
    && domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
}

fn is_phone(text: &str) -> bool {
  let body = text.strip_prefix('+').unwrap_or(text);
  if !body
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
  {
    return false;
  }
  let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
  (7..=15).contains(&digits)
}

pub struct Field {
  pub name: &'static str,
  pub label: &'static str,
  pub required: bool,
  pub rule: Rule,
}

const fn required(name: &'static str, label: &'static str, rule: Rule) -> Field {
  Field {
    name,
    label,
    required: true,
    rule,
  }
}

const fn optional(name: &'static str, label: &'static str, rule: Rule) -> Field {
  Field {
    name,
    label,
    required: false,
    rule,
  }
}

type CrossCheck = fn(&Map<String, Value>) -> Option<FieldError>;

pub struct Schema {
  pub fields: &'static [Field],
  cross_check: Option<CrossCheck>,
}

impl Schema {
  /// Validate a complete form body.
  pub fn validate(&self, body: &Value) -> Result<(), ValidationErrors> {
    self.check(body, false)
  }

  /// Validate a partial update: absent fields are fine, present ones must pass.
  pub fn validate_patch(&self, body: &Value) -> Result<(), ValidationErrors> {
    self.check(body, true)
  }

  fn check(&self, body: &Value, partial: bool) -> Result<(), ValidationErrors> {
    let Some(object) = body.as_object() else {
      return Err(ValidationErrors::single(
        "body",
        "Request body must be a JSON object",
      ));
    };

    let mut errors = ValidationErrors::default();
    if partial && !self.fields.iter().any(|f| object.contains_key(f.name)) {
      errors.push("body", "No fields to update".to_string());
      return errors.into_result();
    }

    for field in self.fields {
      match object.get(field.name) {
        // A partial update may leave a required field out, never clear it
        None if partial => {}
        None | Some(Value::Null) => {
          if field.required {
            errors.push(field.name, format!("{} is required", field.label));
          }
        }
        Some(value) => {
          if let Err(message) = field.rule.check(field.label, value, field.required) {
            errors.push(field.name, message);
          }
        }
      }
    }

    if errors.0.is_empty() {
      if let Some(error) = self.cross_check.and_then(|check| check(object)) {
        errors.0.push(error);
      }
    }

    errors.into_result()
  }
}

pub static CLASS: Schema = Schema {
  fields: &[
    required("name", "Name", Rule::Text { min: 1, max: 50 }),
    optional("description", "Description", Rule::Text { min: 0, max: 500 }),
  ],
  cross_check: None,
};

pub static STUDENT: Schema = Schema {
  fields: &[
    required("name", "Name", Rule::Text { min: 2, max: 100 }),
    optional("age", "Age", Rule::Integer { min: 1, max: 120 }),
    required("classId", "Class", Rule::Id),
    optional("parentId", "Parent", Rule::Id),
    optional("pictureUrl", "Picture URL", Rule::Text { min: 0, max: 2048 }),
  ],
  cross_check: None,
};

pub static PARENT: Schema = Schema {
  fields: &[
    required("name", "Name", Rule::Text { min: 2, max: 100 }),
    required("phone", "Phone", Rule::Phone),
    required("email", "Email", Rule::Email),
    optional("address", "Address", Rule::Text { min: 0, max: 255 }),
    optional("studentIds", "Students", Rule::IdList),
  ],
  cross_check: None,
};

pub static USER: Schema = Schema {
  fields: &[
    required("name", "Name", Rule::Text { min: 2, max: 100 }),
    required("email", "Email", Rule::Email),
    required("role", "Role", Rule::OneOf(Role::ALL)),
    optional("password", "Password", Rule::Password),
  ],
  cross_check: None,
};

pub static ATTENDANCE: Schema = Schema {
  fields: &[
    required("studentId", "Student", Rule::Id),
    optional("classId", "Class", Rule::Id),
    optional("checkInTime", "Check-in time", Rule::Timestamp),
    optional("checkOutTime", "Check-out time", Rule::Timestamp),
  ],
  cross_check: Some(check_out_after_check_in),
};

pub static SIGN_IN: Schema = Schema {
  fields: &[
    required("email", "Email", Rule::Email),
    required("password", "Password", Rule::Text { min: 1, max: 128 }),
  ],
  cross_check: None,
};

pub static REGISTER: Schema = Schema {
  fields: &[
    required("name", "Name", Rule::Text { min: 2, max: 100 }),
    required("email", "Email", Rule::Email),
    required("password", "Password", Rule::Password),
    optional("role", "Role", Rule::OneOf(Role::ALL)),
  ],
  cross_check: None,
};

pub static FORGOT_PASSWORD: Schema = Schema {
  fields: &[required("email", "Email", Rule::Email)],
  cross_check: None,
};

pub static RESET_PASSWORD: Schema = Schema {
  fields: &[
    required("token", "Reset token", Rule::Text { min: 1, max: 512 }),
    required("password", "Password", Rule::Password),
  ],
  cross_check: None,
};

pub static VERIFY_EMAIL: Schema = Schema {
  fields: &[required("token", "Verification token", Rule::Text { min: 1, max: 512 })],
  cross_check: None,
};

fn check_out_after_check_in(object: &Map<String, Value>) -> Option<FieldError> {
  let parse = |key: &str| {
    object
      .get(key)
      .and_then(Value::as_str)
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
  };
  match (parse("checkInTime"), parse("checkOutTime")) {
    (Some(check_in), Some(check_out)) if check_out < check_in => Some(FieldError {
      field: "checkOutTime",
      message: "Check-out time must be after check-in time".to_string(),
    }),
    _ => None,
  }
}

/// Typed form bound to its schema.
pub trait Validate: Serialize {
  fn schema() -> &'static Schema;

  fn validate(&self) -> Result<(), ValidationErrors> {
    let body = serde_json::to_value(self).unwrap_or(Value::Null);
    Self::schema().validate(&body)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassForm {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Validate for ClassForm {
  fn schema() -> &'static Schema {
    &CLASS
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentForm {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub age: Option<u32>,
  pub class_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,
}

impl Validate for StudentForm {
  fn schema() -> &'static Schema {
    &STUDENT
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentForm {
  pub name: String,
  pub phone: String,
  pub email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub student_ids: Vec<String>,
}

impl Validate for ParentForm {
  fn schema() -> &'static Schema {
    &PARENT
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserForm {
  pub name: String,
  pub email: String,
  pub role: Role,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
}

impl Validate for UserForm {
  fn schema() -> &'static Schema {
    &USER
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceForm {
  pub student_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub check_in_time: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub check_out_time: Option<DateTime<Utc>>,
}

impl Validate for AttendanceForm {
  fn schema() -> &'static Schema {
    &ATTENDANCE
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignInForm {
  pub email: String,
  pub password: String,
}

impl Validate for SignInForm {
  fn schema() -> &'static Schema {
    &SIGN_IN
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterForm {
  pub name: String,
  pub email: String,
  pub password: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
}

impl Validate for RegisterForm {
  fn schema() -> &'static Schema {
    &REGISTER
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetPasswordForm {
  pub token: String,
  pub password: String,
}

impl Validate for ResetPasswordForm {
  fn schema() -> &'static Schema {
    &RESET_PASSWORD
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_blank_class_name_is_required() {
    let errors = CLASS.validate(&json!({ "name": "   " })).unwrap_err();
    assert_eq!(errors.field("name"), Some("Name is required"));

    let errors = CLASS.validate(&json!({})).unwrap_err();
    assert!(errors.to_string().contains("required"));
  }

  #[test]
  fn test_valid_class() {
    assert!(CLASS.validate(&json!({ "name": "JSS1A" })).is_ok());
    let form = ClassForm {
      name: "JSS1A".to_string(),
      description: None,
    };
    assert!(form.validate().is_ok());
  }

  #[test]
  fn test_patch_only_checks_present_fields() {
    assert!(STUDENT.validate_patch(&json!({ "age": 12 })).is_ok());
    let errors = STUDENT.validate_patch(&json!({ "age": 0 })).unwrap_err();
    assert_eq!(errors.field("age"), Some("Age must be between 1 and 120"));
    let errors = STUDENT.validate_patch(&json!({ "unknown": 1 })).unwrap_err();
    assert_eq!(errors.field("body"), Some("No fields to update"));
  }

  #[test]
  fn test_patch_null_clears_only_optional_fields() {
    let errors = STUDENT.validate_patch(&json!({ "name": null })).unwrap_err();
    assert_eq!(errors.field("name"), Some("Name is required"));
    assert!(STUDENT.validate_patch(&json!({ "parentId": null })).is_ok());
  }

  #[test]
  fn test_parent_contact_formats() {
    let form = ParentForm {
      name: "Grace Hopper".to_string(),
      phone: "+234 803-555-0101".to_string(),
      email: "grace@example.com".to_string(),
      ..Default::default()
    };
    assert!(form.validate().is_ok());

    let bad = ParentForm {
      phone: "12ab".to_string(),
      email: "grace@example".to_string(),
      ..form
    };
    let errors = bad.validate().unwrap_err();
    assert_eq!(errors.field("phone"), Some("Phone must be a valid phone number"));
    assert_eq!(
      errors.field("email"),
      Some("Email must be a valid email address")
    );
  }

  #[test]
  fn test_user_role_must_be_known() {
    let errors = USER
      .validate(&json!({ "name": "Sam", "email": "sam@school.test", "role": "TEACHER" }))
      .unwrap_err();
    assert_eq!(errors.field("role"), Some("Role must be one of ADMIN, SECURITY"));
  }

  #[test]
  fn test_short_password_rejected() {
    let form = RegisterForm {
      name: "Sam".to_string(),
      email: "sam@school.test".to_string(),
      password: "short".to_string(),
      role: None,
    };
    let errors = form.validate().unwrap_err();
    assert_eq!(
      errors.field("password"),
      Some("Password must be at least 8 characters")
    );
  }

  #[test]
  fn test_check_out_before_check_in() {
    let errors = ATTENDANCE
      .validate(&json!({
        "studentId": "s1",
        "checkInTime": "2024-05-01T08:00:00Z",
        "checkOutTime": "2024-05-01T07:00:00Z"
      }))
      .unwrap_err();
    assert_eq!(
      errors.field("checkOutTime"),
      Some("Check-out time must be after check-in time")
    );
  }

  #[test]
  fn test_non_object_body() {
    let errors = CLASS.validate(&json!(["JSS1A"])).unwrap_err();
    assert_eq!(errors.field("body"), Some("Request body must be a JSON object"));
  }
}
