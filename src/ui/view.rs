use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// Key hint rendered in the header bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  /// Sort order, ascending
  pub priority: u8,
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// What the App should do after a view handled input or ticked
pub enum ViewAction {
  None,
  /// Open a view on top of this one
  Push(Box<dyn View>),
  /// Close this view, or quit from the root
  Pop,
  /// Report a failure in the footer
  Notify(String),
}

/// A screen on the navigation stack.
///
/// The App forwards keys to the top view, which owns its own input modes
/// (filter, form fields, delete confirmation) and answers with a ViewAction.
/// Views showing server data hold a Query<T> and poll it in tick().
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Label for this view in the footer trail
  fn breadcrumb_label(&self) -> String;

  /// Called on every event so views can poll queries and pending writes
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// The view became visible again, or the terminal regained focus
  fn focus(&mut self) {}

  /// True while the view is capturing text, so global keys pass through
  fn is_editing(&self) -> bool {
    false
  }

  /// Hints for the header; views add their own keys
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
