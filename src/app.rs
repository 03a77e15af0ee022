use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::school::types::{Attendance, Class, Parent, QrCode, Student, User};
use crate::school::CachedApiClient;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{DashboardView, RecordListView};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{info, warn};

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` palette, drawn over the current view
  command_input: CommandInput,

  client: CachedApiClient,

  /// Shown in the footer until the next command
  last_error: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(config: &Config, token: Option<String>) -> Result<Self> {
    let client = CachedApiClient::new(config, token)?;
    info!(api = client.base_url(), "dashboard client ready");

    Ok(Self {
      view_stack: Vec::new(),
      command_input: CommandInput::new(),
      client,
      last_error: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Cleanup terminal, even when the loop failed
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
  ) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    // Views fetch as soon as they exist, so this needs the runtime
    self.view_stack.push(Box::new(DashboardView::new(&self.client)));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::FocusGained => {
        if let Some(view) = self.view_stack.last_mut() {
          view.focus();
        }
      }
      Event::Tick => {}
    }

    // Queries are polled on every event, not just ticks, so results show up
    // while keys are held down
    let action = match self.view_stack.last_mut() {
      Some(view) => view.tick(),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let editing = self
      .view_stack
      .last()
      .map(|v| v.is_editing())
      .unwrap_or(false);

    // The palette only opens when the view isn't capturing text
    if self.command_input.is_active() || !editing {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled if self.command_input.is_active() => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
          // The revealed view may be out of date
          if let Some(view) = self.view_stack.last_mut() {
            view.focus();
          }
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Notify(message) => {
        warn!("{}", message);
        self.last_error = Some(message);
      }
    }
  }

  /// Root view for a section command, if the name is one
  fn section_view(&self, name: &str) -> Option<Box<dyn View>> {
    let client = self.client.clone();
    let view: Box<dyn View> = match name {
      "dashboard" => Box::new(DashboardView::new(&client)),
      "students" => Box::new(RecordListView::<Student>::new(client)),
      "classes" => Box::new(RecordListView::<Class>::new(client)),
      "parents" => Box::new(RecordListView::<Parent>::new(client)),
      "users" => Box::new(RecordListView::<User>::new(client)),
      "attendance" => Box::new(RecordListView::<Attendance>::new(client)),
      "qrcodes" => Box::new(RecordListView::<QrCode>::new(client)),
      _ => return None,
    };
    Some(view)
  }

  fn execute_command(&mut self, cmd: &str) {
    self.last_error = None;

    if cmd == "quit" {
      self.should_quit = true;
      return;
    }

    // A new root counts as focus: its query mounts and revalidates stale data
    match self.section_view(cmd) {
      Some(view) => {
        self.view_stack.clear();
        self.view_stack.push(view);
      }
      None => self.last_error = Some(format!("Unknown command: {}", cmd)),
    }
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.view_stack.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command_input
  }

  pub fn api_url(&self) -> &str {
    self.client.base_url()
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  /// Breadcrumb labels from root to current view
  pub fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }
}
