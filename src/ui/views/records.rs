use crate::cache::Cacheable;
use crate::query::{Query, QueryOptions};
use crate::school::forms::{AttendanceForm, ClassForm, ParentForm, StudentForm, UserForm};
use crate::school::types::{Attendance, Class, Parent, QrCode, Student, User};
use crate::school::{CachedApiClient, MutationError, ResourceKey};
use crate::ui::components::{KeyResult, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_time, presence_color, role_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::FormView;
use std::time::Duration;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use tokio::sync::mpsc;

/// A record type that can be listed in a table view
pub trait TableRow: Cacheable {
  /// Title for the table and breadcrumb
  const TITLE: &'static str;

  /// Whether `d` deletes from the full collection
  const DELETABLE: bool = true;

  /// The collection these records live in
  fn collection() -> ResourceKey;

  fn headers() -> &'static [&'static str];

  fn widths() -> Vec<Constraint>;

  fn cells(&self) -> Vec<Cell<'static>>;

  /// Text the `/` filter matches against
  fn search_text(&self) -> Vec<&str>;

  /// Short name used in the delete confirmation
  fn label(&self) -> String;

  fn query_options() -> QueryOptions {
    QueryOptions::default()
  }

  /// View opened with `n`, if the collection has a create form
  fn create_view(_client: &CachedApiClient) -> Option<Box<dyn View>> {
    None
  }

  /// View opened with Enter on a record
  fn detail_view(&self, _client: &CachedApiClient) -> Option<Box<dyn View>> {
    None
  }
}

fn optional(value: Option<&str>) -> String {
  value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

impl TableRow for Student {
  const TITLE: &'static str = "Students";

  fn collection() -> ResourceKey {
    ResourceKey::Students
  }

  fn headers() -> &'static [&'static str] {
    &["Name", "Age", "Class", "Parent", "Present", "Absent", "Late"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(28),
      Constraint::Length(5),
      Constraint::Percentage(16),
      Constraint::Percentage(22),
      Constraint::Length(8),
      Constraint::Length(8),
      Constraint::Length(6),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    let class = self
      .class
      .as_ref()
      .map(|c| c.name.as_str())
      .or(self.class_id.as_deref());
    let parent = self
      .parent
      .as_ref()
      .map(|p| p.name.as_str())
      .or(self.parent_id.as_deref());
    vec![
      Cell::from(truncate(&self.name, 32)),
      Cell::from(self.age.map(|a| a.to_string()).unwrap_or_else(|| "-".into())),
      Cell::from(truncate(&optional(class), 16)),
      Cell::from(truncate(&optional(parent), 24)),
      Cell::from(Span::styled(
        self.attendance_count.to_string(),
        Style::default().fg(Color::Green),
      )),
      Cell::from(Span::styled(
        self.absence_count.to_string(),
        Style::default().fg(Color::Red),
      )),
      Cell::from(Span::styled(
        self.late_count.to_string(),
        Style::default().fg(Color::Yellow),
      )),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    let mut text = vec![self.name.as_str()];
    if let Some(class) = &self.class {
      text.push(&class.name);
    }
    if let Some(parent) = &self.parent {
      text.push(&parent.name);
    }
    text
  }

  fn label(&self) -> String {
    format!("student {}", self.name)
  }

  fn create_view(client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(FormView::<StudentForm>::new(client.clone())))
  }

  fn detail_view(&self, client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(RecordListView::<Attendance>::scoped(
      client.clone(),
      ResourceKey::AttendanceByStudent {
        id: self.id.clone(),
      },
      format!("Attendance [{}]", self.name),
    )))
  }
}

impl TableRow for Class {
  const TITLE: &'static str = "Classes";

  fn collection() -> ResourceKey {
    ResourceKey::Classes
  }

  fn headers() -> &'static [&'static str] {
    &["Name", "Description", "Students"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(25),
      Constraint::Percentage(60),
      Constraint::Length(9),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    vec![
      Cell::from(Span::styled(
        truncate(&self.name, 24),
        Style::default().fg(Color::Cyan),
      )),
      Cell::from(truncate(&optional(self.description.as_deref()), 60)),
      Cell::from(self.students.len().to_string()),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    vec![self.name.as_str(), self.description.as_deref().unwrap_or("")]
  }

  fn label(&self) -> String {
    format!("class {}", self.name)
  }

  fn create_view(client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(FormView::<ClassForm>::new(client.clone())))
  }

  fn detail_view(&self, client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(RecordListView::<Attendance>::scoped(
      client.clone(),
      ResourceKey::AttendanceByClass {
        id: self.id.clone(),
      },
      format!("Attendance [{}]", self.name),
    )))
  }
}

impl TableRow for Parent {
  const TITLE: &'static str = "Parents";

  fn collection() -> ResourceKey {
    ResourceKey::Parents
  }

  fn headers() -> &'static [&'static str] {
    &["Name", "Phone", "Email", "Children"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(28),
      Constraint::Percentage(18),
      Constraint::Percentage(30),
      Constraint::Percentage(24),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    let children = self
      .students
      .iter()
      .map(|s| s.name.as_str())
      .collect::<Vec<_>>()
      .join(", ");
    vec![
      Cell::from(truncate(&self.name, 28)),
      Cell::from(self.phone.clone()),
      Cell::from(truncate(&self.email, 32)),
      Cell::from(truncate(&optional(Some(&children)), 28)),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    let mut text = vec![self.name.as_str(), self.phone.as_str(), self.email.as_str()];
    text.extend(self.students.iter().map(|s| s.name.as_str()));
    text
  }

  fn label(&self) -> String {
    format!("parent {}", self.name)
  }

  fn create_view(client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(FormView::<ParentForm>::new(client.clone())))
  }
}

impl TableRow for User {
  const TITLE: &'static str = "Users";

  fn collection() -> ResourceKey {
    ResourceKey::Users
  }

  fn headers() -> &'static [&'static str] {
    &["Name", "Email", "Role"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(35),
      Constraint::Percentage(45),
      Constraint::Length(10),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    vec![
      Cell::from(truncate(&self.name, 32)),
      Cell::from(truncate(&self.email, 40)),
      Cell::from(Span::styled(
        self.role.to_string(),
        Style::default().fg(role_color(self.role)),
      )),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    vec![self.name.as_str(), self.email.as_str()]
  }

  fn label(&self) -> String {
    format!("user {}", self.email)
  }

  fn create_view(client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(FormView::<UserForm>::new(client.clone())))
  }
}

impl TableRow for Attendance {
  const TITLE: &'static str = "Attendance";

  fn collection() -> ResourceKey {
    ResourceKey::Attendance
  }

  fn headers() -> &'static [&'static str] {
    &["Student", "Class", "Checked in", "Checked out", "Day"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(28),
      Constraint::Percentage(16),
      Constraint::Length(17),
      Constraint::Length(17),
      Constraint::Length(10),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    let class = self
      .class
      .as_ref()
      .map(|c| c.name.as_str())
      .or(self.class_id.as_deref());
    vec![
      Cell::from(Span::styled(
        truncate(self.student_name(), 28),
        Style::default().fg(presence_color(self.check_in_time, self.check_out_time)),
      )),
      Cell::from(truncate(&optional(class), 16)),
      Cell::from(format_time(self.check_in_time)),
      Cell::from(format_time(self.check_out_time)),
      Cell::from(optional(self.day.as_deref())),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    let mut text = vec![self.student_name()];
    if let Some(class) = &self.class {
      text.push(&class.name);
    }
    if let Some(day) = &self.day {
      text.push(day);
    }
    text
  }

  fn label(&self) -> String {
    format!("attendance record for {}", self.student_name())
  }

  fn create_view(client: &CachedApiClient) -> Option<Box<dyn View>> {
    Some(Box::new(FormView::<AttendanceForm>::new(client.clone())))
  }
}

impl TableRow for QrCode {
  const TITLE: &'static str = "QR codes";
  const DELETABLE: bool = false;

  fn collection() -> ResourceKey {
    ResourceKey::StudentQrCodes
  }

  fn headers() -> &'static [&'static str] {
    &["Student", "Code", "Valid from", "Valid until"]
  }

  fn widths() -> Vec<Constraint> {
    vec![
      Constraint::Percentage(25),
      Constraint::Percentage(35),
      Constraint::Length(17),
      Constraint::Length(17),
    ]
  }

  fn cells(&self) -> Vec<Cell<'static>> {
    vec![
      Cell::from(truncate(&self.student_id, 24)),
      Cell::from(Span::styled(
        truncate(&self.code, 32),
        Style::default().fg(Color::Cyan),
      )),
      Cell::from(format_time(self.valid_from)),
      Cell::from(format_time(self.valid_until)),
    ]
  }

  fn search_text(&self) -> Vec<&str> {
    vec![self.student_id.as_str(), self.code.as_str()]
  }

  fn label(&self) -> String {
    format!("QR code for {}", self.student_id)
  }

  /// Codes are reissued rarely
  fn query_options() -> QueryOptions {
    QueryOptions {
      stale_time: Some(Duration::from_secs(300)),
      ..QueryOptions::default()
    }
  }
}

/// Record awaiting a `y` to be deleted
struct PendingDelete {
  id: String,
  label: String,
}

/// Table of records from one collection with filtering, refresh and
/// optimistic delete
pub struct RecordListView<T: TableRow> {
  client: CachedApiClient,
  key: ResourceKey,
  title: String,
  query: Query<Vec<T>>,
  table_state: TableState,
  search: SearchInput,
  confirm: Option<PendingDelete>,
  /// Deletes are only offered on the full collection; scoped lists share
  /// records with it but not the list URL
  deletable: bool,
  results_tx: mpsc::UnboundedSender<Result<String, MutationError>>,
  results_rx: mpsc::UnboundedReceiver<Result<String, MutationError>>,
}

impl<T: TableRow> RecordListView<T> {
  /// The whole collection
  pub fn new(client: CachedApiClient) -> Self {
    let options = T::query_options();
    Self::build(client, T::collection(), T::TITLE.to_string(), T::DELETABLE, options)
  }

  /// A filtered sub-list served under a different key, read-only. It is
  /// opened from a parent record and refreshed with `r` rather than on focus.
  pub fn scoped(client: CachedApiClient, key: ResourceKey, title: String) -> Self {
    let options = QueryOptions {
      revalidate_on_focus: false,
      ..T::query_options()
    };
    Self::build(client, key, title, false, options)
  }

  fn build(
    client: CachedApiClient,
    key: ResourceKey,
    title: String,
    deletable: bool,
    options: QueryOptions,
  ) -> Self {
    let mut query = client.query(&key).with_options(options);
    query.mount();
    let (results_tx, results_rx) = mpsc::unbounded_channel();

    Self {
      client,
      key,
      title,
      query,
      table_state: TableState::default(),
      search: SearchInput::new(),
      confirm: None,
      deletable,
      results_tx,
      results_rx,
    }
  }

  /// Records passing the current filter
  fn visible(&self) -> Vec<&T> {
    self
      .query
      .data()
      .map(|records| {
        records
          .iter()
          .filter(|r| self.search.matches(&r.search_text()))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<&T> {
    let idx = self.table_state.selected()?;
    self.visible().get(idx).copied()
  }

  fn start_delete(&mut self, pending: PendingDelete) {
    let mutator = self.client.mutator().clone();
    let key = self.key.clone();
    let tx = self.results_tx.clone();
    tokio::spawn(async move {
      let result = mutator
        .delete_optimistic::<T>(&key, &pending.id)
        .await
        .map(|_| pending.label);
      let _ = tx.send(result);
    });
  }

  fn title(&self) -> String {
    let count = self.visible().len();
    let filter = if self.search.query().is_empty() {
      String::new()
    } else {
      format!(" /{}", self.search.query())
    };
    match (self.query.error(), self.query.is_loading()) {
      (Some(e), _) => format!(" {} (error: {}) ", self.title, e),
      (None, true) => format!(" {} (loading...) ", self.title),
      (None, false) => format!(" {} ({}){} ", self.title, count, filter),
    }
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let title = self.title();
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let visible = self.visible();
    if visible.is_empty() {
      let content = if self.query.is_loading() {
        "Loading..."
      } else if self.query.data().is_none() {
        "Failed to load. Press 'r' to retry."
      } else if !self.search.query().is_empty() {
        "Nothing matches the filter."
      } else {
        "No records yet."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let rows: Vec<Row> = visible.iter().map(|r| Row::new(r.cells())).collect();
    let len = rows.len();

    let table = Table::new(rows, T::widths())
      .header(
        Row::new(T::headers().to_vec()).style(Style::default().fg(Color::DarkGray).bold()),
      )
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    ensure_valid_selection(&mut self.table_state, len);
    frame.render_stateful_widget(table, area, &mut self.table_state);
  }

  fn render_confirm(&self, frame: &mut Frame, area: Rect) {
    let Some(pending) = &self.confirm else {
      return;
    };
    let line_area = Rect::new(
      area.x + 1,
      area.bottom().saturating_sub(2),
      area.width.saturating_sub(2),
      1,
    );
    let prompt = Line::from(vec![
      Span::styled(
        format!(" Delete {}? ", pending.label),
        Style::default().fg(Color::Red).bold(),
      ),
      Span::styled("(y/n)", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(
      Paragraph::new(prompt).style(Style::default().bg(Color::Black)),
      line_area.intersection(area),
    );
  }
}

impl<T: TableRow> View for RecordListView<T> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if let Some(pending) = self.confirm.take() {
      if key.code == KeyCode::Char('y') {
        self.start_delete(pending);
      }
      return ViewAction::None;
    }

    // Let the filter try first
    match self.search.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(_) => {
        self.table_state.select(Some(0));
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.table_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.table_state.select_last(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('n') => {
        if let Some(view) = T::create_view(&self.client) {
          return ViewAction::Push(view);
        }
      }
      KeyCode::Char('d') if self.deletable => {
        if self.client.mutator().is_submitting() {
          return ViewAction::Notify(MutationError::InFlight.to_string());
        }
        self.confirm = self.selected().map(|record| PendingDelete {
          id: record.cache_key(),
          label: record.label(),
        });
      }
      KeyCode::Enter => {
        if let Some(view) = self.selected().and_then(|r| r.detail_view(&self.client)) {
          return ViewAction::Push(view);
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_table(frame, area);
    self.render_confirm(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.title.clone()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();

    let mut action = ViewAction::None;
    while let Ok(result) = self.results_rx.try_recv() {
      if let Err(e) = result {
        action = ViewAction::Notify(format!("Delete failed: {}", e));
      }
    }
    action
  }

  fn focus(&mut self) {
    self.query.focus();
  }

  fn is_editing(&self) -> bool {
    self.search.is_active() || self.confirm.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if self.deletable {
      shortcuts.push(ShortcutInfo::new("d", "delete").with_priority(60));
    }
    if T::create_view(&self.client).is_some() {
      shortcuts.push(ShortcutInfo::new("n", "new").with_priority(50));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use axum::extract::{Path, State};
  use axum::routing::{delete, get};
  use axum::{Json, Router};
  use crossterm::event::KeyModifiers;
  use ratatui::backend::TestBackend;
  use ratatui::Terminal;
  use serde_json::{json, Value};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  type Classes = Arc<Mutex<Vec<Value>>>;

  async fn client_with_classes() -> CachedApiClient {
    let classes: Classes = Arc::new(Mutex::new(vec![
      json!({ "id": "c1", "name": "JSS1A", "description": "First years" }),
      json!({ "id": "c2", "name": "SS3B" }),
    ]));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new()
      .route(
        "/api/classes",
        get(|State(classes): State<Classes>| async move {
          let data = classes.lock().unwrap().clone();
          Json(json!({ "success": true, "data": data }))
        }),
      )
      .route(
        "/api/classes/:id",
        delete(
          |State(classes): State<Classes>, Path(id): Path<String>| async move {
            classes.lock().unwrap().retain(|c| c["id"] != id.as_str());
            Json(json!({ "success": true, "data": null }))
          },
        ),
      )
      .with_state(classes);
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });

    let mut config = Config::default();
    config.client.api_url = Some(format!("http://{}/api", addr));
    CachedApiClient::new(&config, None).unwrap()
  }

  async fn loaded_view(client: CachedApiClient) -> RecordListView<Class> {
    let mut view = RecordListView::<Class>::new(client);
    for _ in 0..50 {
      view.tick();
      if view.query.data().is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    view
  }

  #[tokio::test]
  async fn test_filter_narrows_rows() {
    let mut view = loaded_view(client_with_classes().await).await;
    assert_eq!(view.visible().len(), 2);

    view.handle_key(key(KeyCode::Char('/')));
    for c in "ss3".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    view.handle_key(key(KeyCode::Enter));

    let visible = view.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "SS3B");
  }

  #[tokio::test]
  async fn test_delete_needs_confirmation() {
    let mut view = loaded_view(client_with_classes().await).await;
    view.table_state.select(Some(0));

    view.handle_key(key(KeyCode::Char('d')));
    assert!(view.is_editing());
    // Anything but `y` cancels
    view.handle_key(key(KeyCode::Char('n')));
    assert!(!view.is_editing());
    assert_eq!(view.visible().len(), 2);

    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('y')));
    for _ in 0..50 {
      view.tick();
      if view.visible().len() == 1 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(view.visible().len(), 1);
    assert_eq!(view.visible()[0].id, "c2");
  }

  #[tokio::test]
  async fn test_new_opens_class_form() {
    let mut view = loaded_view(client_with_classes().await).await;
    assert!(matches!(
      view.handle_key(key(KeyCode::Char('n'))),
      ViewAction::Push(_)
    ));
  }

  #[tokio::test]
  async fn test_renders_rows() {
    let mut view = loaded_view(client_with_classes().await).await;
    let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();
    terminal.draw(|frame| view.render(frame, frame.area())).unwrap();

    let buffer = terminal.backend().buffer();
    let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
    assert!(text.contains("JSS1A"));
    assert!(text.contains("First years"));
    assert!(text.contains("Classes (2)"));
  }

  #[tokio::test]
  async fn test_scoped_list_ignores_focus() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let hits = Arc::new(AtomicUsize::new(0));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new()
      .route(
        "/api/attendance/student/:id",
        get(|State(hits): State<Arc<AtomicUsize>>| async move {
          hits.fetch_add(1, Ordering::SeqCst);
          Json(json!({ "success": true, "data": [{ "id": "a1", "studentId": "s1" }] }))
        }),
      )
      .with_state(Arc::clone(&hits));
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });

    let mut config = Config::default();
    config.client.api_url = Some(format!("http://{}/api", addr));
    config.client.dedupe_secs = 0;
    let client = CachedApiClient::new(&config, None).unwrap();

    let mut view = RecordListView::<Attendance>::scoped(
      client,
      ResourceKey::AttendanceByStudent { id: "s1".into() },
      "Attendance: s1".to_string(),
    );
    for _ in 0..50 {
      view.tick();
      if view.query.data().is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    view.focus();
    for _ in 0..10 {
      view.tick();
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // `r` still reaches the server
    view.handle_key(key(KeyCode::Char('r')));
    for _ in 0..50 {
      view.tick();
      if hits.load(Ordering::SeqCst) == 2 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
  }
}
