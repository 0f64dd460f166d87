// ABOUTME: TUI state and the pure update function
// ABOUTME: Keys and results come in as Msg, side effects go out as Command

use claudes_core::{Session, SupervisorEvent};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A session plus its transcript preview, loaded off the render path
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub session: Session,
    pub preview: String,
}

#[derive(Debug)]
pub enum Msg {
    Tick,
    Key(KeyEvent),
    /// Result of a refresh: rows sorted by start time
    Loaded(Result<Vec<SessionRow>, String>),
    /// Result of deleting the session with this id
    Deleted(Result<String, String>),
    /// Progress line from the supervisor
    Event(SupervisorEvent),
}

/// Work the event loop performs on behalf of `update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Delete(String),
    Quit,
}

#[derive(Debug, Default)]
pub struct App {
    pub rows: Vec<SessionRow>,
    pub cursor: usize,
    pub error: Option<String>,
    /// Latest supervisor event
    pub status: Option<String>,
    attach: Option<Session>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session picked with enter, if any
    pub fn take_attach(&mut self) -> Option<Session> {
        self.attach.take()
    }

    fn selected(&self) -> Option<&SessionRow> {
        self.rows.get(self.cursor)
    }

    pub fn update(&mut self, msg: Msg) -> Option<Command> {
        match msg {
            Msg::Tick => Some(Command::Refresh),
            Msg::Key(key) => self.handle_key(key),
            Msg::Loaded(Ok(rows)) => {
                self.rows = rows;
                self.cursor = self.cursor.min(self.rows.len().saturating_sub(1));
                None
            }
            Msg::Loaded(Err(e)) => {
                self.error = Some(e);
                None
            }
            Msg::Deleted(Ok(id)) => {
                self.status = Some(format!("Deleted session {id}"));
                Some(Command::Refresh)
            }
            Msg::Deleted(Err(e)) => {
                self.error = Some(e);
                Some(Command::Refresh)
            }
            Msg::Event(event) => {
                let refresh = matches!(event, SupervisorEvent::Started { .. });
                self.status = Some(event.to_string());
                refresh.then_some(Command::Refresh)
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => {
                Some(Command::Quit)
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
                self.cursor = self.cursor.saturating_sub(1);
                None
            }
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
                if self.cursor + 1 < self.rows.len() {
                    self.cursor += 1;
                }
                None
            }
            (KeyCode::Enter, _) => {
                let session = self.selected()?.session.clone();
                self.attach = Some(session);
                Some(Command::Quit)
            }
            (KeyCode::Char('d'), _) => {
                let id = self.selected()?.session.id.clone();
                Some(Command::Delete(id))
            }
            (KeyCode::Char('r'), _) => {
                self.error = None;
                Some(Command::Refresh)
            }
            _ => None,
        }
    }
}
