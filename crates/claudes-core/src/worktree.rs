// ABOUTME: Per-session git worktrees: branch-safe naming, creation and removal
// ABOUTME: Names come from the agent, worktrees from `git worktree` subprocesses

use crate::agent::{collect_text, AgentClient, QueryRequest};
use crate::error::WorktreeError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tokio_util::sync::CancellationToken;

/// Prefix applied to every branch created for a session
pub const BRANCH_PREFIX: &str = "claude/";

/// Maximum length of a sanitized name, before the id suffix
pub const MAX_NAME_LEN: usize = 50;

/// Length of the session id suffix appended to generated names
const ID_SUFFIX_LEN: usize = 5;

/// A worktree created for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    /// Directory basename
    pub name: String,
    /// Full branch name, including the `claude/` prefix
    pub branch: String,
    pub path: PathBuf,
}

/// Creates and removes isolated working copies
pub trait Worktrees: Send + Sync {
    /// Create `<base_dir>/<worktree_name>` on a new branch `claude/<branch_name>`
    /// starting from the current branch.
    fn create(
        &self,
        base_dir: &Path,
        branch_name: &str,
        worktree_name: &str,
    ) -> Result<WorktreeInfo, WorktreeError>;

    /// Delete the worktree at `path`
    fn remove(&self, path: &Path) -> Result<(), WorktreeError>;
}

/// `Worktrees` backed by the git CLI
#[derive(Debug, Clone)]
pub struct GitWorktrees {
    git: PathBuf,
    /// Repository to operate on; `None` means the process's current directory
    repo_dir: Option<PathBuf>,
}

impl Default for GitWorktrees {
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
            repo_dir: None,
        }
    }
}

impl GitWorktrees {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(repo_dir.into()),
            ..Self::default()
        }
    }

    fn git<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        if let Some(repo) = &self.repo_dir {
            cmd.arg("-C").arg(repo);
        }
        cmd.args(args).output()
    }

    /// Branch currently checked out in the repository
    pub fn current_branch(&self) -> Result<String, WorktreeError> {
        let output = self
            .git(["rev-parse", "--abbrev-ref", "HEAD"])
            .map_err(|e| WorktreeError::CurrentBranch(e.to_string()))?;
        if !output.status.success() {
            return Err(WorktreeError::CurrentBranch(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Worktrees for GitWorktrees {
    fn create(
        &self,
        base_dir: &Path,
        branch_name: &str,
        worktree_name: &str,
    ) -> Result<WorktreeInfo, WorktreeError> {
        let current_branch = self.current_branch()?;
        let path = base_dir.join(worktree_name);
        let branch = format!("{BRANCH_PREFIX}{branch_name}");

        std::fs::create_dir_all(base_dir)?;

        let output = self.git([
            OsStr::new("worktree"),
            OsStr::new("add"),
            OsStr::new("-b"),
            OsStr::new(&branch),
            path.as_os_str(),
            OsStr::new(&current_branch),
        ])?;
        if !output.status.success() {
            return Err(WorktreeError::Command {
                command: "worktree add".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(path = %path.display(), branch = %branch, from = %current_branch, "Created worktree");
        Ok(WorktreeInfo {
            name: worktree_name.to_string(),
            branch,
            path,
        })
    }

    fn remove(&self, path: &Path) -> Result<(), WorktreeError> {
        let output = self.git([OsStr::new("worktree"), OsStr::new("remove"), path.as_os_str()])?;
        if !output.status.success() {
            return Err(WorktreeError::Command {
                command: "worktree remove".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::info!(path = %path.display(), "Removed worktree");
        Ok(())
    }
}

/// Meta-prompt asking the agent for a branch name for `task`
pub fn name_prompt(task: &str) -> String {
    format!(
        r#"Based on this task description, generate a short, descriptive name suitable for a git branch.

Task: {task}

Requirements:
- Maximum 50 characters
- Use lowercase letters, numbers, and hyphens only
- Be descriptive but concise
- Start with a word describing the action (add, fix, update, refactor, etc.)
- Example formats: "add-user-authentication", "fix-memory-leak", "update-api-endpoints"

Respond with ONLY the branch name, nothing else."#
    )
}

/// Ask the agent for a branch-safe name for `prompt`, suffixed with the
/// first characters of `session_id` so names never collide.
pub async fn generate_name(
    agent: &dyn AgentClient,
    prompt: &str,
    session_id: &str,
    cancel: CancellationToken,
) -> Result<String, WorktreeError> {
    let request = QueryRequest::new(name_prompt(prompt), format!("name-gen-{session_id}"));
    let stream = agent.query(request, cancel).await?;
    let response = collect_text(stream).await?;

    let name = sanitize_branch_name(response.trim());
    let suffix = session_id.get(..ID_SUFFIX_LEN).unwrap_or(session_id);
    Ok(format!("{name}-{suffix}"))
}

/// Reduce arbitrary text to `[a-z0-9-]`, no leading, trailing or doubled
/// hyphens, at most 50 chars. Falls back to `task`.
pub fn sanitize_branch_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let mut name = out.trim_matches('-').to_string();
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
        if name.ends_with('-') {
            name.pop();
        }
    }

    if name.is_empty() {
        "task".to_string()
    } else {
        name
    }
}
