// ABOUTME: Filesystem layout under the home directory and the optional config file
// ABOUTME: Config is TOML with defaults for every field; ANTHROPIC_MODEL overrides the model

use crate::agent::ClaudeCliConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `model`
pub const MODEL_ENV: &str = "ANTHROPIC_MODEL";

/// Where claudes keeps its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// `<home>/.claudes`
    pub base: PathBuf,
    /// Session records, one JSON file each
    pub sessions: PathBuf,
    /// Transcripts, one text file each
    pub outputs: PathBuf,
    pub logs: PathBuf,
    /// Default parent directory for worktrees
    pub worktrees: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    /// Layout rooted at the current user's home directory
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::new(&home))
    }

    pub fn new(home: &Path) -> Self {
        let base = home.join(".claudes");
        Self {
            sessions: base.join("sessions"),
            outputs: base.join("outputs"),
            logs: base.join("logs"),
            config_file: base.join("config.toml"),
            worktrees: home.join(".claudes-work"),
            base,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Agent CLI binary
    #[serde(default = "default_claude_binary")]
    pub claude_binary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Parent directory for worktrees; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_dir: Option<String>,

    #[serde(default)]
    pub skip_permissions: bool,

    /// Per-turn timeout for the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_claude_binary() -> String {
    "claude".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            claude_binary: default_claude_binary(),
            model: None,
            worktree_dir: None,
            skip_permissions: false,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, then apply environment overrides
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        Ok(config.with_model_override(std::env::var(MODEL_ENV).ok()))
    }

    /// Replace `model` with a non-empty override
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = Some(model);
        }
        self
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configured worktree base with `~` expanded
    pub fn worktree_dir_expanded(&self) -> Option<PathBuf> {
        self.worktree_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }

    /// Settings for the claude CLI client
    pub fn agent_config(&self) -> ClaudeCliConfig {
        ClaudeCliConfig {
            binary: self.claude_binary.clone(),
            model: self.model.clone(),
            skip_permissions: self.skip_permissions,
            timeout_secs: self.timeout_secs,
            ..ClaudeCliConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::new(Path::new("/home/me"));
        assert_eq!(paths.base, PathBuf::from("/home/me/.claudes"));
        assert_eq!(paths.sessions, PathBuf::from("/home/me/.claudes/sessions"));
        assert_eq!(paths.outputs, PathBuf::from("/home/me/.claudes/outputs"));
        assert_eq!(paths.logs, PathBuf::from("/home/me/.claudes/logs"));
        assert_eq!(paths.worktrees, PathBuf::from("/home/me/.claudes-work"));
        assert_eq!(
            paths.config_file,
            PathBuf::from("/home/me/.claudes/config.toml")
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            claude_binary = "/opt/claude"
            model = "claude-opus"
            worktree_dir = "~/work"
            skip_permissions = true
            timeout_secs = 600
        "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.claude_binary, "/opt/claude");
        assert_eq!(config.model.as_deref(), Some("claude-opus"));
        assert!(config.skip_permissions);
        assert_eq!(config.timeout_secs, Some(600));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.claude_binary, "claude");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.claude_binary, "claude");
        assert_eq!(config.worktree_dir, None);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "claude_binary = [").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            model: Some("claude-sonnet".to_string()),
            worktree_dir: Some("/srv/work".to_string()),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_model_override() {
        let config = Config {
            model: Some("from-file".to_string()),
            ..Config::default()
        };
        let overridden = config.clone().with_model_override(Some("from-env".to_string()));
        assert_eq!(overridden.model.as_deref(), Some("from-env"));

        let unchanged = config.clone().with_model_override(Some("  ".to_string()));
        assert_eq!(unchanged.model.as_deref(), Some("from-file"));
        assert_eq!(config.with_model_override(None).model.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_worktree_dir_expands_tilde() {
        let config = Config {
            worktree_dir: Some("~/claude-work".to_string()),
            ..Config::default()
        };
        let expanded = config.worktree_dir_expanded().unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("claude-work"));
        assert_eq!(Config::default().worktree_dir_expanded(), None);
    }

    #[test]
    fn test_agent_config_carries_settings() {
        let config = Config {
            claude_binary: "/opt/claude".to_string(),
            model: Some("m".to_string()),
            skip_permissions: true,
            timeout_secs: Some(30),
            worktree_dir: None,
        };
        let agent = config.agent_config();
        assert_eq!(agent.binary, "/opt/claude");
        assert_eq!(agent.model.as_deref(), Some("m"));
        assert!(agent.skip_permissions);
        assert_eq!(agent.timeout_secs, Some(30));
        assert!(agent.launcher_args.is_empty());
    }
}
