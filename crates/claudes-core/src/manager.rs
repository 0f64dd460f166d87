// ABOUTME: Runs one cancellable agent conversation per session, streaming text to a transcript
// ABOUTME: Tracks live sessions in a registry of cancellation tokens keyed by session id

use crate::agent::{AgentClient, QueryRequest};
use crate::error::{AgentError, ManagerError};
use crate::session::{Session, Status};
use crate::store::Store;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Maximum number of transcript bytes returned by `tail`
pub const TAIL_BYTES: u64 = 200;

/// Written to the transcript before every follow-up turn
pub const FOLLOWUP_DELIMITER: &str = "\n\n--- Follow-up ---\n";

/// A live session's cancellation token, tagged with the spawn that owns it
struct Entry {
    serial: u64,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Entry>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a session from the registry when its task ends, however it ends.
/// A later spawn under the same id keeps its own entry.
struct Registration {
    registry: Registry,
    id: String,
    serial: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        if registry.get(&self.id).map(|e| e.serial) == Some(self.serial) {
            registry.remove(&self.id);
        }
    }
}

pub struct Manager {
    output_dir: PathBuf,
    agent: Arc<dyn AgentClient>,
    store: Option<Arc<Store>>,
    registry: Registry,
    next_serial: AtomicU64,
    tracker: TaskTracker,
}

impl Manager {
    /// Create the transcript directory and an empty registry
    pub fn new(
        output_dir: impl Into<PathBuf>,
        agent: Arc<dyn AgentClient>,
    ) -> Result<Self, ManagerError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| ManagerError::Io {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            output_dir,
            agent,
            store: None,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_serial: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        })
    }

    /// Persist records on spawn and write back agent id and final status
    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn transcript_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{id}.txt"))
    }

    /// Start the session's conversation in the background.
    ///
    /// Assigns `output_file`, truncates the transcript and registers a
    /// cancellation token before returning. With a store attached the record
    /// is saved here too, so the task's own write-backs always land later.
    pub fn spawn(&self, session: &mut Session) -> Result<(), ManagerError> {
        let path = self.transcript_path(&session.id);
        let io_err = |source| ManagerError::Io {
            path: path.clone(),
            source,
        };
        // truncate, then write in append mode so follow-up turns are never overwritten
        std::fs::File::create(&path).map_err(io_err)?;
        let file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        session.output_file = path.clone();

        if let Some(store) = &self.store {
            store.save(session)?;
        }

        let cancel = CancellationToken::new();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            serial,
            cancel: cancel.clone(),
        };
        if let Some(previous) = lock(&self.registry).insert(session.id.clone(), entry) {
            tracing::warn!(session = %session.id, "Session spawned twice, stopping the earlier task");
            previous.cancel.cancel();
        }
        let registration = Registration {
            registry: self.registry.clone(),
            id: session.id.clone(),
            serial,
        };

        tracing::info!(session = %session.id, agent = self.agent.name(), "Spawning session");
        self.tracker.spawn(run_session(
            session.clone(),
            self.agent.clone(),
            self.store.clone(),
            tokio::fs::File::from_std(file),
            cancel,
            registration,
        ));
        Ok(())
    }

    /// Last `TAIL_BYTES` bytes of the transcript, starting on a UTF-8 boundary
    pub fn tail(&self, session: &Session) -> Result<String, ManagerError> {
        let path = &session.output_file;
        if path.as_os_str().is_empty() {
            return Err(ManagerError::NoTranscript(session.id.clone()));
        }
        let io_err = |source| ManagerError::Io {
            path: path.clone(),
            source,
        };

        let mut file = std::fs::File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        file.seek(SeekFrom::Start(len.saturating_sub(TAIL_BYTES)))
            .map_err(io_err)?;
        let mut buf = Vec::with_capacity(TAIL_BYTES as usize);
        file.take(TAIL_BYTES)
            .read_to_end(&mut buf)
            .map_err(io_err)?;

        let start = buf
            .iter()
            .take(3)
            .take_while(|b| (**b & 0b1100_0000) == 0b1000_0000)
            .count();
        Ok(String::from_utf8_lossy(&buf[start..]).into_owned())
    }

    /// Signal the session's task to stop; no-op for unknown ids
    pub fn stop(&self, id: &str) {
        if let Some(entry) = lock(&self.registry).get(id) {
            tracing::info!(session = %id, "Stopping session");
            entry.cancel.cancel();
        }
    }

    pub fn stop_all(&self) {
        for entry in lock(&self.registry).values() {
            entry.cancel.cancel();
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        lock(&self.registry).contains_key(id)
    }

    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.registry).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for every spawned task to finish
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Run a follow-up turn on a prior session, mirroring text to stdout.
    ///
    /// Resumes the agent's conversation when the record carries `agent_id`,
    /// otherwise the agent starts a fresh one.
    pub async fn attach(
        &self,
        cancel: CancellationToken,
        session: &Session,
        followup: &str,
    ) -> Result<(), ManagerError> {
        let path = if session.output_file.as_os_str().is_empty() {
            self.transcript_path(&session.id)
        } else {
            session.output_file.clone()
        };
        let io_err = |source| ManagerError::Io {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        file.write_all(FOLLOWUP_DELIMITER.as_bytes())
            .await
            .map_err(io_err)?;

        let working_dir = match &session.worktree_path {
            Some(dir) => match usable_dir(dir) {
                Ok(()) => Some(dir.clone()),
                Err(reason) => {
                    let line = format!(
                        "Warning: failed to use worktree directory {}: {reason}\n",
                        dir.display()
                    );
                    file.write_all(line.as_bytes()).await.map_err(io_err)?;
                    None
                }
            },
            None => None,
        };
        if session.agent_id.is_none() {
            tracing::info!(session = %session.id, "No agent conversation id recorded, attach starts fresh");
        }

        let request = QueryRequest::new(followup, session.id.clone())
            .resume(session.agent_id.clone())
            .working_dir(working_dir);

        let mut record = session.clone();
        let store = self.store.clone();
        let on_agent_id = |id: &str| {
            if record.agent_id.as_deref() != Some(id) {
                record.agent_id = Some(id.to_string());
                if let Some(store) = &store {
                    write_back(store, &record);
                }
            }
        };

        let mut stdout = tokio::io::stdout();
        let result = drive(
            self.agent.as_ref(),
            request,
            cancel,
            &mut file,
            Some(&mut stdout),
            on_agent_id,
        )
        .await;

        if let Err(err) = &result {
            if !matches!(err, ManagerError::Agent(AgentError::Cancelled)) {
                let line = format!("\nSession error: {err}\n");
                file.write_all(line.as_bytes()).await.map_err(io_err)?;
            }
        }
        file.flush().await.map_err(io_err)?;
        result
    }
}

/// Background task body for `Manager::spawn`
async fn run_session(
    mut session: Session,
    agent: Arc<dyn AgentClient>,
    store: Option<Arc<Store>>,
    mut transcript: tokio::fs::File,
    cancel: CancellationToken,
    _registration: Registration,
) {
    let working_dir = match &session.worktree_path {
        Some(dir) => match usable_dir(dir) {
            Ok(()) => Some(dir.clone()),
            Err(reason) => {
                tracing::warn!(session = %session.id, dir = %dir.display(), %reason, "Worktree unusable");
                let line = format!(
                    "Warning: failed to use worktree directory {}: {reason}\n",
                    dir.display()
                );
                if let Err(e) = transcript.write_all(line.as_bytes()).await {
                    tracing::warn!(session = %session.id, error = %e, "Failed to write transcript");
                }
                None
            }
        },
        None => None,
    };

    let request = QueryRequest::new(session.prompt.clone(), session.id.clone())
        .working_dir(working_dir);

    let on_agent_id = |id: &str| {
        if session.agent_id.as_deref() != Some(id) {
            session.agent_id = Some(id.to_string());
            if let Some(store) = &store {
                write_back(store, &session);
            }
        }
    };

    let result = drive(
        agent.as_ref(),
        request,
        cancel,
        &mut transcript,
        None::<&mut tokio::io::Stdout>,
        on_agent_id,
    )
    .await;

    session.status = match &result {
        Ok(()) => {
            tracing::info!(session = %session.id, "Session complete");
            Status::Complete
        }
        Err(ManagerError::Agent(AgentError::Cancelled)) => {
            tracing::info!(session = %session.id, "Session stopped");
            Status::Failed
        }
        Err(err) => {
            tracing::warn!(session = %session.id, error = %err, "Session failed");
            let line = format!("\nSession error: {err}\n");
            if let Err(e) = transcript.write_all(line.as_bytes()).await {
                tracing::warn!(session = %session.id, error = %e, "Failed to write transcript");
            }
            Status::Failed
        }
    };

    if let Err(e) = transcript.flush().await {
        tracing::warn!(session = %session.id, error = %e, "Failed to flush transcript");
    }
    drop(transcript);

    if let Some(store) = &store {
        write_back(store, &session);
    }
}

/// Drain one turn: assistant text goes to `transcript` (and `mirror`), agent
/// conversation ids go to `on_agent_id`.
async fn drive<T, M>(
    agent: &dyn AgentClient,
    request: QueryRequest,
    cancel: CancellationToken,
    transcript: &mut T,
    mut mirror: Option<&mut M>,
    mut on_agent_id: impl FnMut(&str),
) -> Result<(), ManagerError>
where
    T: AsyncWrite + Unpin,
    M: AsyncWrite + Unpin,
{
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
        stream = agent.query(request, cancel.clone()) => stream?,
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
            next = stream.next() => next,
        };
        let Some(message) = next else {
            return Ok(());
        };
        let message = message?;

        if let Some(id) = message.session_id() {
            on_agent_id(id);
        }
        let Some(text) = message.text() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        transcript
            .write_all(text.as_bytes())
            .await
            .map_err(AgentError::Io)?;
        if let Some(out) = mirror.as_deref_mut() {
            out.write_all(text.as_bytes()).await.map_err(AgentError::Io)?;
            out.flush().await.map_err(AgentError::Io)?;
        }
    }
}

fn usable_dir(dir: &Path) -> Result<(), String> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err("not a directory".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Rewrite the whole record, unless it has been deleted meanwhile
fn write_back(store: &Store, session: &Session) {
    match store.save_existing(session) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(session = %session.id, "Record gone, skipping write-back");
        }
        Err(e) => {
            tracing::warn!(session = %session.id, error = %e, "Failed to write back session record");
        }
    }
}
