use crate::query::Query;
use crate::school::types::DashboardStats;
use crate::school::CachedApiClient;
use crate::ui::renderfns::{format_time, presence_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

/// School overview: collection totals, today's check-ins and the latest
/// attendance records. Refreshes on an interval and on focus.
pub struct DashboardView {
  query: Query<DashboardStats>,
}

impl DashboardView {
  pub fn new(client: &CachedApiClient) -> Self {
    let mut query = client.dashboard();
    query.mount();
    Self { query }
  }

  fn title(&self) -> String {
    match (self.query.error(), self.query.is_validating()) {
      (Some(e), _) => format!(" Dashboard (error: {}) ", e),
      (None, true) => " Dashboard (refreshing...) ".to_string(),
      (None, false) => " Dashboard ".to_string(),
    }
  }

  fn render_totals(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let tiles = [
      ("Students", stats.total_students, Color::Cyan),
      ("Classes", stats.total_classes, Color::Blue),
      ("Parents", stats.total_parents, Color::Magenta),
      ("Users", stats.total_users, Color::Yellow),
      ("Present today", stats.attendance_today, Color::Green),
    ];

    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Ratio(1, tiles.len() as u32); 5])
      .split(area);

    for ((label, value, color), column) in tiles.into_iter().zip(columns.iter()) {
      let block = Block::default()
        .title(format!(" {} ", label))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
      let paragraph = Paragraph::new(value.to_string())
        .alignment(Alignment::Center)
        .style(Style::default().fg(color).bold())
        .block(block);
      frame.render_widget(paragraph, *column);
    }
  }

  fn render_recent(&self, frame: &mut Frame, area: Rect, stats: &DashboardStats) {
    let block = Block::default()
      .title(" Recent check-ins ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if stats.recent_attendance.is_empty() {
      let paragraph = Paragraph::new("No check-ins yet.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let rows: Vec<Row> = stats
      .recent_attendance
      .iter()
      .map(|record| {
        let class = record
          .class
          .as_ref()
          .map(|c| c.name.clone())
          .or_else(|| record.class_id.clone())
          .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
          Cell::from(Span::styled(
            truncate(record.student_name(), 28),
            Style::default().fg(presence_color(record.check_in_time, record.check_out_time)),
          )),
          Cell::from(truncate(&class, 16)),
          Cell::from(format_time(record.check_in_time)),
          Cell::from(format_time(record.check_out_time)),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Percentage(35),
        Constraint::Percentage(20),
        Constraint::Percentage(22),
        Constraint::Percentage(23),
      ],
    )
    .header(
      Row::new(vec!["Student", "Class", "Checked in", "Checked out"])
        .style(Style::default().fg(Color::DarkGray).bold()),
    )
    .block(block);
    frame.render_widget(table, area);
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let outer = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let Some(stats) = self.query.data() else {
      let content = if self.query.is_loading() {
        "Loading..."
      } else {
        "Dashboard unavailable. Press 'r' to retry."
      };
      frame.render_widget(
        Paragraph::new(content).style(Style::default().fg(Color::DarkGray)),
        inner,
      );
      return;
    };

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(3), Constraint::Min(3)])
      .split(inner);
    self.render_totals(frame, chunks[0], stats);
    self.render_recent(frame, chunks[1], stats);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    ViewAction::None
  }

  fn focus(&mut self) {
    self.query.focus();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
