use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;

use crate::school::types::Role;

/// Truncate a string to at most `max_len` characters, adding "..." if
/// truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Colour for a user role
pub fn role_color(role: Role) -> Color {
  match role {
    Role::Admin => Color::Magenta,
    Role::Security => Color::Yellow,
  }
}

/// Colour for an attendance record: still on site, checked out, or never
/// checked in
pub fn presence_color(check_in: Option<DateTime<Utc>>, check_out: Option<DateTime<Utc>>) -> Color {
  match (check_in, check_out) {
    (Some(_), None) => Color::Green,
    (Some(_), Some(_)) => Color::White,
    (None, _) => Color::DarkGray,
  }
}

/// Local wall-clock time for a timestamp, or a dash
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
  time
    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|| "-".to_string())
}
