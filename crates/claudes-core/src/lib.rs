// ABOUTME: Core library for claudes - session records, store, worktrees, agent runner
// ABOUTME: The binary crate wires these together with the CLI and TUI

pub mod agent;
pub mod config;
pub mod error;
pub mod manager;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod worktree;

pub use agent::{
    collect_text, AgentClient, AgentMessage, ClaudeCli, ClaudeCliConfig, ContentBlock,
    MessageStream, QueryRequest,
};
pub use config::{Config, Paths};
pub use error::{AgentError, ConfigError, ManagerError, StoreError, WorktreeError};
pub use manager::Manager;
pub use session::{generate_id, Session, Status};
pub use store::Store;
pub use supervisor::{truncate, Supervisor, SupervisorEvent};
pub use worktree::{generate_name, sanitize_branch_name, GitWorktrees, WorktreeInfo, Worktrees};
