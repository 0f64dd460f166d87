// ABOUTME: Session list TUI: terminal guard, event loop and command runner
// ABOUTME: Returns the session picked for attach, or None when the user quits

pub mod app;
pub mod event;
pub mod ui;

pub use app::{App, Command, Msg, SessionRow};

use anyhow::Result;
use claudes_core::{Manager, Session, Store, SupervisorEvent};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use event::InputPoller;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the session list reloads from disk
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Raw mode plus alternate screen for as long as it lives
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }

    pub fn draw(&mut self, app: &App) -> io::Result<()> {
        self.terminal.draw(|frame| ui::render(frame, app))?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Show the session list until the user quits or picks a session.
///
/// Supervisor events that arrive meanwhile are shown on the status line and
/// appended to `backlog` so they can be printed once the terminal is back.
pub async fn run(
    store: Arc<Store>,
    manager: Arc<Manager>,
    events: &mut mpsc::UnboundedReceiver<SupervisorEvent>,
    backlog: &mut Vec<SupervisorEvent>,
) -> Result<Option<Session>> {
    let mut tui = Tui::new()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let input = InputPoller::start(tx.clone());

    let mut app = App::new();
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    let mut events_open = true;

    loop {
        tui.draw(&app)?;

        let msg = tokio::select! {
            Some(msg) = rx.recv() => msg,
            _ = refresh.tick() => Msg::Tick,
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    backlog.push(event.clone());
                    Msg::Event(event)
                }
                None => {
                    events_open = false;
                    continue;
                }
            },
        };

        match app.update(msg) {
            Some(Command::Quit) => break,
            Some(command) => perform(command, &store, &manager, &tx),
            None => {}
        }
    }

    // stdin goes back to line reads after this
    drop(input);
    drop(tui);
    Ok(app.take_attach())
}

fn perform(
    command: Command,
    store: &Arc<Store>,
    manager: &Arc<Manager>,
    tx: &mpsc::UnboundedSender<Msg>,
) {
    let store = store.clone();
    let manager = manager.clone();
    let tx = tx.clone();

    match command {
        Command::Refresh => {
            tokio::spawn(async move {
                let rows = tokio::task::spawn_blocking(move || load_rows(&store, &manager))
                    .await
                    .unwrap_or_else(|e| Err(e.to_string()));
                let _ = tx.send(Msg::Loaded(rows));
            });
        }
        Command::Delete(id) => {
            manager.stop(&id);
            tokio::spawn(async move {
                let result = tokio::task::spawn_blocking(move || {
                    store.delete(&id).map(|()| id).map_err(|e| e.to_string())
                })
                .await
                .unwrap_or_else(|e| Err(e.to_string()));
                let _ = tx.send(Msg::Deleted(result));
            });
        }
        Command::Quit => {}
    }
}

/// Every stored session with the tail of its transcript
pub fn load_rows(store: &Store, manager: &Manager) -> Result<Vec<SessionRow>, String> {
    let sessions = store.list().map_err(|e| e.to_string())?;
    Ok(sessions
        .into_iter()
        .map(|session| {
            let preview = manager.tail(&session).unwrap_or_else(|e| {
                tracing::debug!(session = %session.id, error = %e, "No preview");
                String::new()
            });
            SessionRow { session, preview }
        })
        .collect())
}
