use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Input for the App loop
#[derive(Debug)]
pub enum Event {
  Key(KeyEvent),
  /// The terminal window regained focus
  FocusGained,
  /// Nothing happened within the tick rate
  Tick,
}

/// Reads the terminal on a blocking thread and hands events to the loop
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Start reading; a Tick is sent whenever `tick_rate` passes without input
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll/read block, so they get their own thread
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
          Ok(CrosstermEvent::FocusGained) => Some(Event::FocusGained),
          _ => None,
        }
      } else {
        Some(Event::Tick)
      };

      if let Some(event) = event {
        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// `None` once the reader thread has stopped
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
