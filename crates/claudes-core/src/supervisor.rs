// ABOUTME: Turns a batch of prompts into running, persisted sessions
// ABOUTME: One task per prompt: optional worktree, manager spawn, then a Started event

use crate::agent::AgentClient;
use crate::error::WorktreeError;
use crate::manager::Manager;
use crate::session::Session;
use crate::store::Store;
use crate::worktree::{generate_name, Worktrees};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Operator-facing progress from `spawn_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Started { id: String, prompt: String },
    WorktreeCreated { id: String, path: PathBuf, branch: String },
    Warning { id: String, message: String },
    Failed { id: String, error: String },
}

impl SupervisorEvent {
    /// Warnings and failures belong on stderr
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SupervisorEvent::Warning { .. } | SupervisorEvent::Failed { .. }
        )
    }
}

impl fmt::Display for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorEvent::Started { id, prompt } => {
                write!(f, "Started: {} ({id})", truncate(prompt, 50))
            }
            SupervisorEvent::WorktreeCreated { path, branch, .. } => {
                write!(f, "Created worktree: {} (branch: {branch})", path.display())
            }
            SupervisorEvent::Warning { message, .. } => write!(f, "Warning: {message}"),
            SupervisorEvent::Failed { error, .. } => write!(f, "Error spawning session: {error}"),
        }
    }
}

/// Shorten `s` to at most `max` chars, ending in `...` when cut
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[derive(Clone)]
pub struct Supervisor {
    store: Arc<Store>,
    manager: Arc<Manager>,
    agent: Arc<dyn AgentClient>,
    worktrees: Arc<dyn Worktrees>,
    worktree_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        store: Arc<Store>,
        manager: Arc<Manager>,
        agent: Arc<dyn AgentClient>,
        worktrees: Arc<dyn Worktrees>,
    ) -> Self {
        Self {
            store,
            manager,
            agent,
            worktrees,
            worktree_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Give every session its own worktree under `dir`
    pub fn with_worktree_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.worktree_dir = Some(dir.into());
        self
    }

    /// Cancelling this token abandons in-flight worktree naming and keeps
    /// prompts that have not started yet from starting at all
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start one task per non-empty trimmed prompt. Each handle resolves to
    /// the session once it is running, or `None` if it could not be spawned.
    pub fn spawn_all(
        &self,
        prompts: &[String],
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Vec<JoinHandle<Option<Session>>> {
        prompts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|prompt| {
                let this = self.clone();
                let prompt = prompt.to_string();
                let events = events.clone();
                tokio::spawn(async move { this.start(prompt, events).await })
            })
            .collect()
    }

    async fn start(
        &self,
        prompt: String,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Option<Session> {
        let mut session = Session::new(prompt);

        if let Some(base_dir) = &self.worktree_dir {
            self.provision_worktree(&mut session, base_dir.clone(), &events)
                .await;
        }

        // shutting down: starting now would leave a record nobody finishes
        if self.cancel.is_cancelled() {
            tracing::info!(session = %session.id, "Supervisor cancelled, not starting session");
            return None;
        }

        if let Err(e) = self.manager.spawn(&mut session) {
            tracing::error!(session = %session.id, error = %e, "Failed to spawn session");
            let _ = events.send(SupervisorEvent::Failed {
                id: session.id.clone(),
                error: e.to_string(),
            });
            return None;
        }

        if !self.manager.has_store() {
            if let Err(e) = self.store.save(&session) {
                tracing::error!(session = %session.id, error = %e, "Failed to save session");
                let _ = events.send(SupervisorEvent::Failed {
                    id: session.id.clone(),
                    error: e.to_string(),
                });
                return Some(session);
            }
        }

        let _ = events.send(SupervisorEvent::Started {
            id: session.id.clone(),
            prompt: session.prompt.clone(),
        });
        Some(session)
    }

    /// Name and create the session's worktree. Failures only warn.
    async fn provision_worktree(
        &self,
        session: &mut Session,
        base_dir: PathBuf,
        events: &mpsc::UnboundedSender<SupervisorEvent>,
    ) {
        let warn = |message: String| {
            tracing::warn!(session = %session.id, %message, "Continuing without worktree");
            let _ = events.send(SupervisorEvent::Warning {
                id: session.id.clone(),
                message,
            });
        };

        let name = match generate_name(
            self.agent.as_ref(),
            &session.prompt,
            &session.id,
            self.cancel.child_token(),
        )
        .await
        {
            Ok(name) => name,
            Err(e) => {
                let reason = match e {
                    WorktreeError::NameGeneration(inner) => inner.to_string(),
                    other => other.to_string(),
                };
                warn(format!("failed to generate worktree name: {reason}"));
                return;
            }
        };

        let worktrees = self.worktrees.clone();
        let created =
            tokio::task::spawn_blocking(move || worktrees.create(&base_dir, &name, &name)).await;
        let info = match created {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                warn(format!("failed to create worktree: {e}"));
                return;
            }
            Err(e) => {
                warn(format!("failed to create worktree: {e}"));
                return;
            }
        };

        let _ = events.send(SupervisorEvent::WorktreeCreated {
            id: session.id.clone(),
            path: info.path.clone(),
            branch: info.branch.clone(),
        });
        session.set_worktree(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 50), "hello");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééé", 4), "é...");
        assert_eq!(truncate(&"x".repeat(50), 50), "x".repeat(50));
    }

    #[test]
    fn test_event_lines() {
        let started = SupervisorEvent::Started {
            id: "1a2b3c4d".to_string(),
            prompt: "hello".to_string(),
        };
        assert_eq!(started.to_string(), "Started: hello (1a2b3c4d)");
        assert!(!started.is_error());

        let long = SupervisorEvent::Started {
            id: "1a2b3c4d".to_string(),
            prompt: "p".repeat(80),
        };
        assert_eq!(
            long.to_string(),
            format!("Started: {}... (1a2b3c4d)", "p".repeat(47))
        );

        let warning = SupervisorEvent::Warning {
            id: "1a2b3c4d".to_string(),
            message: "failed to create worktree: boom".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "Warning: failed to create worktree: boom"
        );
        assert!(warning.is_error());

        let created = SupervisorEvent::WorktreeCreated {
            id: "1a2b3c4d".to_string(),
            path: PathBuf::from("/w/add-x-1a2b3"),
            branch: "claude/add-x-1a2b3".to_string(),
        };
        assert_eq!(
            created.to_string(),
            "Created worktree: /w/add-x-1a2b3 (branch: claude/add-x-1a2b3)"
        );
    }
}
