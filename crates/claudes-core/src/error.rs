// ABOUTME: Error types for claudes-core
// ABOUTME: One enum per concern: store, worktree, agent, manager, config

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the on-disk session store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session record {id} is corrupt: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize session {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from worktree naming, creation and removal
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("Failed to get current branch: {0}")]
    CurrentBranch(String),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Failed to run git: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to generate worktree name: {0}")]
    NameGeneration(#[from] AgentError),
}

/// Errors raised while talking to the agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to start agent: {0}")]
    Spawn(String),

    #[error("Agent IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Reported(String),

    #[error("Agent exited with status: {0:?}")]
    Exited(Option<i32>),

    #[error("Agent turn timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

/// Errors from the session manager
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Transcript IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session has no transcript file: {0}")]
    NoTranscript(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Errors while resolving paths or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
