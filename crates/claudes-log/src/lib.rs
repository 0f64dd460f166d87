// ABOUTME: Shared logging setup for the claudes binary
// ABOUTME: init() for headless runs on stderr, init_file() while the TUI owns the terminal

use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn filter(default: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(default.into())
}

/// Log to stderr at INFO, plus any per-target directives in RUST_LOG.
/// Headless runs only; the TUI would be drawn over.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter(Level::INFO))
        .with_writer(std::io::stderr)
        .init();
}

/// Append WARN and above, plus RUST_LOG's per-target directives, to
/// `<log_dir>/<app_name>.log`.
/// A setup failure is reported once on stderr and the run goes on unlogged.
pub fn init_file(app_name: &str) {
    if let Err(e) = init_file_inner(app_name) {
        eprintln!("Warning: failed to set up file logging: {e}");
    }
}

/// `~/.claudes/logs`, if a home directory is known
pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claudes").join("logs"))
}

fn init_file_inner(app_name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let log_dir = log_dir().ok_or("could not determine home directory")?;
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{app_name}.log")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(Level::WARN))
        .with_writer(log_file)
        .with_ansi(false)
        .try_init()?;

    Ok(())
}
