use crate::school::forms::{
  AttendanceForm, ClassForm, ParentForm, StudentForm, UserForm, Validate, ValidationErrors,
};
use crate::school::types::{Class, Role};
use crate::school::{CachedApiClient, MutationError, Mutator, ResourceKey};
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use async_trait::async_trait;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use reqwest::Method;
use std::marker::PhantomData;
use tokio::sync::mpsc;

/// A create form filled in from plain text fields
#[async_trait]
pub trait CreateForm: Validate + Send + Sync + Sized + 'static {
  /// Title and breadcrumb, e.g. "New class"
  const TITLE: &'static str;

  /// Body field name and label of each input, in display order
  const FIELDS: &'static [(&'static str, &'static str)];

  /// Build the form from the raw text of each field, in `FIELDS` order.
  /// Text that can't become the field's type is reported against it.
  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors>;

  /// Send the form and refresh whatever it affects
  async fn save(self, mutator: &Mutator) -> Result<(), MutationError>;
}

fn text(value: &str) -> String {
  value.trim().to_string()
}

fn optional_text(value: &str) -> Option<String> {
  let value = value.trim();
  (!value.is_empty()).then(|| value.to_string())
}

/// POST to the collection behind `key`
async fn create(mutator: &Mutator, key: ResourceKey, form: &impl Validate) -> Result<(), MutationError> {
  mutator
    .submit(Method::POST, &key.path(), form, &key)
    .await
    .map(|_| ())
}

#[async_trait]
impl CreateForm for ClassForm {
  const TITLE: &'static str = "New class";
  const FIELDS: &'static [(&'static str, &'static str)] =
    &[("name", "Name"), ("description", "Description")];

  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors> {
    Ok(Self {
      name: text(values[0]),
      description: optional_text(values[1]),
    })
  }

  /// Shows the class in the list before the server answers
  async fn save(self, mutator: &Mutator) -> Result<(), MutationError> {
    let pending = Class {
      id: format!("pending-{}", Utc::now().timestamp_millis()),
      name: self.name.clone(),
      description: self.description.clone(),
      students: Vec::new(),
    };
    mutator
      .create_optimistic(&ResourceKey::Classes, &self, pending)
      .await
      .map(|_| ())
  }
}

#[async_trait]
impl CreateForm for StudentForm {
  const TITLE: &'static str = "New student";
  const FIELDS: &'static [(&'static str, &'static str)] = &[
    ("name", "Name"),
    ("age", "Age"),
    ("classId", "Class id"),
    ("parentId", "Parent id"),
  ];

  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors> {
    let age = match optional_text(values[1]) {
      Some(age) => Some(
        age
          .parse::<u32>()
          .map_err(|_| ValidationErrors::single("age", "Age must be a whole number"))?,
      ),
      None => None,
    };
    Ok(Self {
      name: text(values[0]),
      age,
      class_id: text(values[2]),
      parent_id: optional_text(values[3]),
    })
  }

  async fn save(self, mutator: &Mutator) -> Result<(), MutationError> {
    create(mutator, ResourceKey::Students, &self).await
  }
}

#[async_trait]
impl CreateForm for ParentForm {
  const TITLE: &'static str = "New parent";
  const FIELDS: &'static [(&'static str, &'static str)] = &[
    ("name", "Name"),
    ("phone", "Phone"),
    ("email", "Email"),
    ("address", "Address"),
  ];

  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors> {
    Ok(Self {
      name: text(values[0]),
      phone: text(values[1]),
      email: text(values[2]),
      address: optional_text(values[3]),
      student_ids: Vec::new(),
    })
  }

  async fn save(self, mutator: &Mutator) -> Result<(), MutationError> {
    create(mutator, ResourceKey::Parents, &self).await
  }
}

#[async_trait]
impl CreateForm for UserForm {
  const TITLE: &'static str = "New user";
  const FIELDS: &'static [(&'static str, &'static str)] = &[
    ("name", "Name"),
    ("email", "Email"),
    ("role", "Role"),
    ("password", "Password"),
  ];

  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors> {
    let role = match values[2].trim().to_ascii_uppercase().as_str() {
      "ADMIN" => Role::Admin,
      "SECURITY" => Role::Security,
      "" => return Err(ValidationErrors::single("role", "Role is required")),
      _ => {
        return Err(ValidationErrors::single(
          "role",
          format!("Role must be one of {}", Role::ALL.join(", ")),
        ))
      }
    };
    // Passwords are sent exactly as typed
    let password = (!values[3].is_empty()).then(|| values[3].to_string());
    Ok(Self {
      name: text(values[0]),
      email: text(values[1]),
      role,
      password,
    })
  }

  async fn save(self, mutator: &Mutator) -> Result<(), MutationError> {
    create(mutator, ResourceKey::Users, &self).await
  }
}

#[async_trait]
impl CreateForm for AttendanceForm {
  const TITLE: &'static str = "Check in";
  const FIELDS: &'static [(&'static str, &'static str)] =
    &[("studentId", "Student id"), ("classId", "Class id")];

  /// Checks the student in now
  fn from_inputs(values: &[&str]) -> Result<Self, ValidationErrors> {
    Ok(Self {
      student_id: text(values[0]),
      class_id: optional_text(values[1]),
      check_in_time: Some(Utc::now()),
      check_out_time: None,
    })
  }

  async fn save(self, mutator: &Mutator) -> Result<(), MutationError> {
    create(mutator, ResourceKey::Attendance, &self).await
  }
}

/// Create form for any collection. Checks the fields locally before anything
/// is sent and keeps what was typed if the server refuses it.
pub struct FormView<F: CreateForm> {
  client: CachedApiClient,
  inputs: Vec<TextInput>,
  focused: usize,
  field_errors: ValidationErrors,
  /// Last server or submission error, shown as received
  error: Option<String>,
  submitting: bool,
  result_tx: mpsc::UnboundedSender<Result<(), MutationError>>,
  result_rx: mpsc::UnboundedReceiver<Result<(), MutationError>>,
  form: PhantomData<F>,
}

impl<F: CreateForm> FormView<F> {
  pub fn new(client: CachedApiClient) -> Self {
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    Self {
      client,
      inputs: F::FIELDS.iter().map(|_| TextInput::new()).collect(),
      focused: 0,
      field_errors: ValidationErrors::default(),
      error: None,
      submitting: false,
      result_tx,
      result_rx,
      form: PhantomData,
    }
  }

  fn move_focus(&mut self, forward: bool) {
    let len = self.inputs.len();
    self.focused = if forward {
      (self.focused + 1) % len
    } else {
      (self.focused + len - 1) % len
    };
  }

  fn submit(&mut self) {
    if self.submitting {
      return;
    }

    let values: Vec<&str> = self.inputs.iter().map(TextInput::value).collect();
    let form = match F::from_inputs(&values).and_then(|form| form.validate().map(|_| form)) {
      Ok(form) => form,
      Err(errors) => {
        self.field_errors = errors;
        return;
      }
    };
    self.field_errors = ValidationErrors::default();
    self.error = None;
    self.submitting = true;

    let mutator = self.client.mutator().clone();
    let tx = self.result_tx.clone();
    tokio::spawn(async move {
      let _ = tx.send(form.save(&mutator).await);
    });
  }

  fn render_field(&self, frame: &mut Frame, area: Rect, index: usize) {
    let (name, label) = F::FIELDS[index];
    let input = &self.inputs[index];
    let focused = self.focused == index;
    let error = self.field_errors.field(name);

    let border = match (focused, error.is_some()) {
      (_, true) => Color::Red,
      (true, false) => Color::Yellow,
      (false, false) => Color::DarkGray,
    };
    let title = match error {
      Some(message) => format!(" {} ({}) ", label, message),
      None => format!(" {} ", label),
    };
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border));

    let shown = if name == "password" {
      "*".repeat(input.value().chars().count())
    } else {
      input.value().to_string()
    };
    let line = if focused {
      let split = shown
        .char_indices()
        .nth(input.cursor_position())
        .map(|(i, _)| i)
        .unwrap_or(shown.len());
      let (before, after) = shown.split_at(split);
      Line::from(vec![
        Span::raw(before.to_string()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::raw(after.to_string()),
      ])
    } else {
      Line::from(shown)
    };
    frame.render_widget(Paragraph::new(line).block(block), area);
  }
}

impl<F: CreateForm> View for FormView<F> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      // Stay open until the save answers so its outcome has somewhere to go
      KeyCode::Esc if self.submitting => {}
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::Down => self.move_focus(true),
      KeyCode::BackTab | KeyCode::Up => self.move_focus(false),
      KeyCode::Enter => self.submit(),
      _ if self.submitting => {}
      _ => {
        if self.inputs[self.focused].handle_key(key) == InputResult::Consumed {
          self.field_errors = ValidationErrors::default();
        }
      }
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = if self.submitting {
      format!(" {} (saving...) ", F::TITLE)
    } else {
      format!(" {} ", F::TITLE)
    };
    let outer = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let mut constraints: Vec<Constraint> = F::FIELDS.iter().map(|_| Constraint::Length(3)).collect();
    constraints.push(Constraint::Length(1));
    constraints.push(Constraint::Min(1)); // Status
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints(constraints)
      .split(inner);

    for index in 0..F::FIELDS.len() {
      self.render_field(frame, chunks[index], index);
    }

    let status = match &self.error {
      Some(error) => Paragraph::new(error.as_str()).style(Style::default().fg(Color::Red)),
      None => Paragraph::new("Enter to save, Tab to switch field, Esc to cancel")
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(status.wrap(Wrap { trim: true }), chunks[F::FIELDS.len() + 1]);
  }

  fn breadcrumb_label(&self) -> String {
    F::TITLE.to_string()
  }

  fn tick(&mut self) -> ViewAction {
    match self.result_rx.try_recv() {
      Ok(Ok(())) => ViewAction::Pop,
      Ok(Err(e)) => {
        self.submitting = false;
        match e {
          MutationError::Invalid(errors) => self.field_errors = errors,
          other => self.error = Some(other.to_string()),
        }
        ViewAction::None
      }
      Err(_) => ViewAction::None,
    }
  }

  fn is_editing(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "save").with_priority(10),
      ShortcutInfo::new("tab", "next field").with_priority(20),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}
