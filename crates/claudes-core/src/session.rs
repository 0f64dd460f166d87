// ABOUTME: Session record persisted as one JSON document per session
// ABOUTME: Also owns id generation (8 lowercase hex chars)

use crate::worktree::WorktreeInfo;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Running,
    Complete,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Running => "Running",
            Status::Complete => "Complete",
            Status::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// A single conversation with the agent, as recorded on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub prompt: String,
    pub status: Status,
    pub output_file: PathBuf,
    pub started: DateTime<Utc>,
    /// Conversation id reported by the agent, used to resume on attach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl Session {
    /// New running session with a fresh id. `output_file` is assigned by the manager.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            prompt: prompt.into(),
            status: Status::Running,
            output_file: PathBuf::new(),
            started: Utc::now(),
            agent_id: None,
            worktree_path: None,
            worktree_name: None,
            branch_name: None,
        }
    }

    /// Record all three worktree fields together
    pub fn set_worktree(&mut self, info: WorktreeInfo) {
        self.worktree_path = Some(info.path);
        self.worktree_name = Some(info.name);
        self.branch_name = Some(info.branch);
    }

    /// The worktree triple, if the session has one
    pub fn worktree(&self) -> Option<WorktreeInfo> {
        match (&self.worktree_path, &self.worktree_name, &self.branch_name) {
            (Some(path), Some(name), Some(branch)) => Some(WorktreeInfo {
                name: name.clone(),
                branch: branch.clone(),
                path: path.clone(),
            }),
            _ => None,
        }
    }

    /// Time since the session started, rounded to whole seconds
    pub fn elapsed(&self) -> Duration {
        let secs = (Utc::now() - self.started).num_milliseconds().max(0) as u64;
        Duration::from_secs((secs + 500) / 1000)
    }
}

/// Generate a session id: 4 random bytes, lowercase hex.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
