// ABOUTME: Integration tests for the supervisor: batch spawn, persistence and worktrees.
// ABOUTME: Uses an in-process agent and a directory-creating worktree stand-in.

use async_trait::async_trait;
use claudes_core::{
    AgentClient, AgentError, AgentMessage, ContentBlock, Manager, MessageStream, QueryRequest,
    Session, Status, Store, Supervisor, SupervisorEvent, WorktreeError, WorktreeInfo, Worktrees,
};
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test doubles
// ============================================================================

enum NameReply {
    Name(String),
    Fail(String),
    /// Never answers until the query is cancelled
    Hang,
}

/// Answers worktree-name queries per `name_reply`; session turns never end
struct FakeAgent {
    name_reply: NameReply,
}

#[async_trait]
impl AgentClient for FakeAgent {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError> {
        if request.conversation.starts_with("name-gen-") {
            let item = match &self.name_reply {
                NameReply::Name(text) => Ok(AgentMessage::Assistant {
                    content: vec![ContentBlock::Text(text.clone())],
                }),
                NameReply::Fail(e) => Err(AgentError::Reported(e.clone())),
                NameReply::Hang => {
                    return Ok(Box::pin(stream::once(async move {
                        cancel.cancelled().await;
                        Err::<AgentMessage, _>(AgentError::Cancelled)
                    })));
                }
            };
            return Ok(Box::pin(stream::iter(vec![item])));
        }
        Ok(Box::pin(stream::pending()))
    }
}

struct FakeWorktrees {
    fail: bool,
    created: Mutex<Vec<String>>,
}

impl Worktrees for FakeWorktrees {
    fn create(
        &self,
        base_dir: &Path,
        branch_name: &str,
        worktree_name: &str,
    ) -> Result<WorktreeInfo, WorktreeError> {
        self.created.lock().unwrap().push(worktree_name.to_string());
        if self.fail {
            return Err(WorktreeError::Command {
                command: "worktree add".to_string(),
                stderr: "not a git repository".to_string(),
            });
        }
        let path = base_dir.join(worktree_name);
        std::fs::create_dir_all(&path)?;
        Ok(WorktreeInfo {
            name: worktree_name.to_string(),
            branch: format!("claude/{branch_name}"),
            path,
        })
    }

    fn remove(&self, path: &Path) -> Result<(), WorktreeError> {
        std::fs::remove_dir_all(path)?;
        Ok(())
    }
}

struct Harness {
    tmp: TempDir,
    store: Arc<Store>,
    manager: Arc<Manager>,
    worktrees: Arc<FakeWorktrees>,
    supervisor: Supervisor,
}

impl Harness {
    fn new(name_reply: NameReply, worktree_fail: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let agent: Arc<dyn AgentClient> = Arc::new(FakeAgent { name_reply });
        let worktrees = Arc::new(FakeWorktrees {
            fail: worktree_fail,
            created: Mutex::new(vec![]),
        });
        let store = Arc::new(
            Store::open(tmp.path().join("sessions"))
                .unwrap()
                .with_worktrees(worktrees.clone()),
        );
        let manager = Arc::new(
            Manager::new(tmp.path().join("outputs"), agent.clone())
                .unwrap()
                .with_store(store.clone()),
        );
        let supervisor = Supervisor::new(store.clone(), manager.clone(), agent, worktrees.clone());
        Self {
            tmp,
            store,
            manager,
            worktrees,
            supervisor,
        }
    }

    fn worktree_base(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    async fn spawn(&self, prompts: &[&str]) -> (Vec<Session>, Vec<SupervisorEvent>) {
        let prompts: Vec<String> = prompts.iter().map(|p| p.to_string()).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handles = self.supervisor.spawn_all(&prompts, tx);

        let mut sessions = Vec::new();
        for handle in handles {
            if let Some(session) = handle.await.unwrap() {
                sessions.push(session);
            }
        }

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (sessions, events)
    }

    async fn finish(&self) {
        self.manager.stop_all();
        self.manager.shutdown().await;
    }
}

fn is_session_id(id: &str) -> bool {
    id.len() == 8 && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

// ============================================================================
// Batch spawn
// ============================================================================

#[tokio::test]
async fn test_spawn_one_prompt_without_worktree() {
    let h = Harness::new(NameReply::Name("unused".to_string()), false);
    let (sessions, events) = h.spawn(&["hello"]).await;

    assert_eq!(sessions.len(), 1);
    let id = sessions[0].id.clone();
    assert!(is_session_id(&id), "bad id {id}");

    let records = h.store.list().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, id);
    assert_eq!(record.status, Status::Running);
    assert_eq!(record.prompt, "hello");
    assert!(record.output_file.ends_with(format!("{id}.txt")));
    assert!(record.output_file.is_absolute());
    assert!(record.output_file.exists());
    assert!(record.worktree_path.is_none());

    let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
    assert_eq!(lines, vec![format!("Started: hello ({id})")]);
    assert!(h.worktrees.created.lock().unwrap().is_empty());

    h.finish().await;
}

#[tokio::test]
async fn test_spawn_many_skips_blank_prompts() {
    let h = Harness::new(NameReply::Name("unused".to_string()), false);
    let (sessions, events) = h.spawn(&["a", "   ", "  b  ", "", "c"]).await;

    assert_eq!(sessions.len(), 3);
    let mut prompts: Vec<String> = sessions.iter().map(|s| s.prompt.clone()).collect();
    prompts.sort();
    assert_eq!(prompts, vec!["a", "b", "c"]);

    assert_eq!(h.store.list().unwrap().len(), 3);
    assert_eq!(h.manager.running_ids().len(), 3);
    let transcripts = std::fs::read_dir(h.tmp.path().join("outputs")).unwrap().count();
    assert_eq!(transcripts, 3);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::Started { .. }))
            .count(),
        3
    );

    h.finish().await;
    for record in h.store.list().unwrap() {
        assert_eq!(record.status, Status::Failed);
    }
}

#[tokio::test]
async fn test_spawn_failure_skips_persistence() {
    let h = Harness::new(NameReply::Name("unused".to_string()), false);
    std::fs::remove_dir_all(h.tmp.path().join("outputs")).unwrap();

    let (sessions, events) = h.spawn(&["doomed"]).await;

    assert!(sessions.is_empty());
    assert!(h.store.list().unwrap().is_empty());
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SupervisorEvent::Failed { .. }));
    assert!(events[0].is_error());
}

// ============================================================================
// Worktree mode
// ============================================================================

#[tokio::test]
async fn test_worktree_mode_records_triple() {
    let mut h = Harness::new(NameReply::Name("Add User Auth".to_string()), false);
    h.supervisor = h.supervisor.clone().with_worktree_dir(h.worktree_base());

    let (sessions, events) = h.spawn(&["add auth to the api"]).await;
    assert_eq!(sessions.len(), 1);
    let id = &sessions[0].id;
    let expected_name = format!("add-user-auth-{}", &id[..5]);

    let record = h.store.load(id).unwrap();
    assert_eq!(record.worktree_name.as_deref(), Some(expected_name.as_str()));
    assert_eq!(
        record.branch_name.as_deref(),
        Some(format!("claude/{expected_name}").as_str())
    );
    assert_eq!(
        record.worktree_path,
        Some(h.worktree_base().join(&expected_name))
    );

    assert!(matches!(events[0], SupervisorEvent::WorktreeCreated { .. }));
    assert!(matches!(events[1], SupervisorEvent::Started { .. }));

    // no warning in the transcript: the directory exists
    h.finish().await;
    let transcript = std::fs::read_to_string(&record.output_file).unwrap();
    assert!(!transcript.contains("Warning"));

    h.store.delete(id).unwrap();
    assert!(!h.worktree_base().join(&expected_name).exists());
}

#[tokio::test]
async fn test_worktree_creation_failure_continues_without_worktree() {
    let mut h = Harness::new(NameReply::Name("fix-bug".to_string()), true);
    h.supervisor = h.supervisor.clone().with_worktree_dir(h.worktree_base());

    let (sessions, events) = h.spawn(&["fix the bug"]).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(h.worktrees.created.lock().unwrap().len(), 1);

    let record = h.store.load(&sessions[0].id).unwrap();
    assert!(record.worktree_path.is_none());
    assert!(record.branch_name.is_none());

    let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Warning: failed to create worktree: "));
    assert!(lines[1].starts_with("Started: fix the bug"));

    h.finish().await;
}

#[tokio::test]
async fn test_name_generation_failure_skips_worktree() {
    let mut h = Harness::new(NameReply::Fail("rate limited".to_string()), false);
    h.supervisor = h.supervisor.clone().with_worktree_dir(h.worktree_base());

    let (sessions, events) = h.spawn(&["anything"]).await;
    assert_eq!(sessions.len(), 1);
    assert!(h.worktrees.created.lock().unwrap().is_empty());

    assert_eq!(
        events[0].to_string(),
        "Warning: failed to generate worktree name: rate limited"
    );
    assert!(h.store.load(&sessions[0].id).unwrap().worktree_path.is_none());

    h.finish().await;
}

#[tokio::test]
async fn test_cancel_during_naming_starts_nothing() {
    let mut h = Harness::new(NameReply::Hang, false);
    h.supervisor = h.supervisor.clone().with_worktree_dir(h.worktree_base());

    let prompts = vec!["first".to_string(), "second".to_string()];
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handles = h.supervisor.spawn_all(&prompts, tx);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    h.supervisor.cancel_token().cancel();

    for handle in handles {
        assert!(handle.await.unwrap().is_none());
    }
    assert!(h.store.list().unwrap().is_empty());
    assert!(h.manager.running_ids().is_empty());
    assert!(h.worktrees.created.lock().unwrap().is_empty());

    while let Ok(event) = rx.try_recv() {
        assert!(
            matches!(event, SupervisorEvent::Warning { .. }),
            "unexpected event {event:?}"
        );
    }
    let transcripts = std::fs::read_dir(h.tmp.path().join("outputs")).unwrap().count();
    assert_eq!(transcripts, 0);

    h.finish().await;
}
