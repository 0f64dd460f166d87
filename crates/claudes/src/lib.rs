// ABOUTME: claudes library: wires config, store, manager and supervisor together
// ABOUTME: and dispatches to the interactive TUI loop or a headless run

pub mod cli;
pub mod run;
pub mod tui;

pub use cli::{parse_prompts, Args};

use anyhow::{bail, Context, Result};
use claudes_core::{
    AgentClient, ClaudeCli, Config, GitWorktrees, Manager, Paths, Session, Store, Supervisor,
    Worktrees,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything a run needs, built from the environment and arguments
pub struct Runtime {
    pub store: Arc<Store>,
    pub manager: Arc<Manager>,
    pub supervisor: Supervisor,
}

impl Runtime {
    pub fn new(paths: &Paths, config: &Config, worktree_dir: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let worktrees: Arc<dyn Worktrees> = Arc::new(GitWorktrees::new(cwd));
        let agent: Arc<dyn AgentClient> = Arc::new(ClaudeCli::new(config.agent_config()));

        let store = Arc::new(
            Store::open(&paths.sessions)
                .context("Failed to open session store")?
                .with_worktrees(worktrees.clone()),
        );
        let manager = Arc::new(
            Manager::new(&paths.outputs, agent.clone())
                .context("Failed to create output directory")?
                .with_store(store.clone()),
        );

        let mut supervisor = Supervisor::new(store.clone(), manager.clone(), agent, worktrees);
        if let Some(dir) = worktree_dir {
            tracing::info!(dir = %dir.display(), "Worktree mode enabled");
            supervisor = supervisor.with_worktree_dir(dir);
        }

        Ok(Self {
            store,
            manager,
            supervisor,
        })
    }
}

/// Worktree base when `-w` is given: `-d`, then the config file, then the default
pub fn worktree_base(args: &Args, config: &Config, paths: &Paths) -> Option<PathBuf> {
    if !args.worktree {
        return None;
    }
    Some(
        args.worktree_dir
            .clone()
            .or_else(|| config.worktree_dir_expanded())
            .unwrap_or_else(|| paths.worktrees.clone()),
    )
}

pub async fn run(args: Args) -> Result<()> {
    let prompts = args.read_prompts()?;
    if args.headless && prompts.is_empty() {
        bail!("--headless needs at least one prompt");
    }

    let paths = Paths::from_home()?;
    let config = Config::load_or_default(&paths.config_file)?;
    let worktree_dir = worktree_base(&args, &config, &paths);
    let Runtime {
        store,
        manager,
        supervisor,
    } = Runtime::new(&paths, &config, worktree_dir)?;

    if args.headless {
        return run::headless(store, manager, supervisor, &prompts).await;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handles = supervisor.spawn_all(&prompts, tx);

    let result = run::interactive(store, manager.clone(), rx).await;

    shut_down(&supervisor, &manager, handles).await;
    result
}

/// Stop the batch for good: no prompt may start once this returns, and every
/// running session has had its final status written.
pub async fn shut_down(
    supervisor: &Supervisor,
    manager: &Manager,
    handles: Vec<JoinHandle<Option<Session>>>,
) {
    supervisor.cancel_token().cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Spawn task panicked");
        }
    }
    manager.stop_all();
    manager.shutdown().await;
}
