// ABOUTME: Top-level run modes: the TUI/attach loop and headless batch runs
// ABOUTME: Owns all operator-facing printing outside the TUI itself

use crate::tui;
use anyhow::{Context, Result};
use claudes_core::{Manager, Session, Store, Supervisor, SupervisorEvent};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress lines go to stdout, warnings and failures to stderr
pub fn print_event(event: &SupervisorEvent) {
    if event.is_error() {
        eprintln!("{event}");
    } else {
        println!("{event}");
    }
}

/// Blocking line read from stdin, kept off the runtime threads
async fn read_line() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await?
    .context("Failed to read from stdin")
}

fn prompt(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

/// Alternate between the session list and attach until the user quits
pub async fn interactive(
    store: Arc<Store>,
    manager: Arc<Manager>,
    mut events: mpsc::UnboundedReceiver<SupervisorEvent>,
) -> Result<()> {
    let mut backlog = Vec::new();
    loop {
        let selected = tui::run(store.clone(), manager.clone(), &mut events, &mut backlog).await;
        for event in backlog.drain(..) {
            print_event(&event);
        }

        let Some(session) = selected? else {
            return Ok(());
        };
        attach(&store, &manager, session).await?;
    }
}

/// Ask for a follow-up and stream the agent's reply into the terminal
async fn attach(store: &Store, manager: &Manager, session: Session) -> Result<()> {
    println!("\nAttaching to: {}", session.prompt);
    prompt("Follow-up: ")?;
    let followup = read_line().await?;
    let followup = followup.trim();
    if followup.is_empty() {
        return Ok(());
    }

    // the listed row may predate the agent id write-back
    let session = store.load(&session.id).unwrap_or(session);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let result = manager.attach(cancel, &session, followup).await;
    ctrl_c.abort();
    if let Err(e) = result {
        tracing::warn!(session = %session.id, error = %e, "Attach failed");
        eprintln!("Error: {e}");
    }

    prompt("\n\nPress Enter to return to TUI...")?;
    read_line().await?;
    Ok(())
}

/// Start the batch, print progress, and wait for every session to end.
/// Ctrl+C stops all sessions; they are recorded as failed.
pub async fn headless(
    store: Arc<Store>,
    manager: Arc<Manager>,
    supervisor: Supervisor,
    prompts: &[String],
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handles = supervisor.spawn_all(prompts, tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let interrupted = CancellationToken::new();
    let watcher = {
        let interrupted = interrupted.clone();
        let naming = supervisor.cancel_token();
        let manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, stopping sessions...");
                interrupted.cancel();
                naming.cancel();
                manager.stop_all();
            }
        })
    };

    let started = collect(handles).await;
    // sessions that started after the interrupt
    if interrupted.is_cancelled() {
        manager.stop_all();
    }
    if !started.is_empty() {
        println!("Waiting for {} session(s)...", started.len());
    }
    manager.shutdown().await;
    watcher.abort();
    let _ = printer.await;

    for session in &started {
        let record = store.load(&session.id).unwrap_or_else(|_| session.clone());
        println!(
            "{}  {:<10}  {}",
            record.id,
            record.status.to_string(),
            record.output_file.display()
        );
    }
    Ok(())
}

async fn collect(handles: Vec<JoinHandle<Option<Session>>>) -> Vec<Session> {
    let mut sessions = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(session)) => sessions.push(session),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Spawn task panicked"),
        }
    }
    sessions
}
