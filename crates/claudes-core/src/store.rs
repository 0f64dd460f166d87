// ABOUTME: File-per-session store: <dir>/<id>.json holds the full session record
// ABOUTME: The directory is the authoritative inventory; deletes also tear down worktrees

use crate::error::StoreError;
use crate::session::Session;
use crate::worktree::{GitWorktrees, Worktrees};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const RECORD_EXT: &str = "json";

/// Persistent inventory of session records
pub struct Store {
    dir: PathBuf,
    worktrees: Arc<dyn Worktrees>,
    /// Serializes record removal against `save_existing`
    records: Mutex<()>,
}

impl Store {
    /// Open (creating if needed) a store rooted at `dir`.
    /// Worktree teardown on delete goes through `git` in the current directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        create_private_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            worktrees: Arc::new(GitWorktrees::default()),
            records: Mutex::new(()),
        })
    }

    /// Replace the provisioner used to remove worktrees on delete
    pub fn with_worktrees(mut self, worktrees: Arc<dyn Worktrees>) -> Self {
        self.worktrees = worktrees;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}"))
    }

    /// Write the whole record, replacing any previous version.
    ///
    /// The payload goes to a temp file in the same directory and is renamed
    /// into place, so `list` never observes partial JSON.
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self.lock_records();
        self.write_record(session)
    }

    /// Rewrite a record only if it is still present. Returns `false` when the
    /// record has been deleted, in which case nothing is written.
    pub fn save_existing(&self, session: &Session) -> Result<bool, StoreError> {
        let _guard = self.lock_records();
        if !self.exists(&session.id) {
            return Ok(false);
        }
        self.write_record(session)?;
        Ok(true)
    }

    fn lock_records(&self) -> MutexGuard<'_, ()> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_record(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.record_path(&session.id);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let data = serde_json::to_vec_pretty(session).map_err(|source| StoreError::Serialize {
            id: session.id.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        std::io::Write::write_all(&mut tmp, &data).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        tracing::debug!(id = %session.id, status = %session.status, "Saved session record");
        Ok(())
    }

    /// Read and parse one record
    pub fn load(&self, id: &str) -> Result<Session, StoreError> {
        let path = self.record_path(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
            id: id.to_string(),
            source,
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).is_file()
    }

    /// Every parseable record, ordered by start time then id.
    /// Unparsable files are skipped so one bad record cannot hide the rest.
    pub fn list(&self) -> Result<Vec<Session>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match self.load(id) {
                Ok(session) if session.id == id => sessions.push(session),
                Ok(session) => {
                    tracing::warn!(file = %path.display(), id = %session.id, "Record id does not match filename, skipping");
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable session record");
                }
            }
        }

        sessions.sort_by(|a, b| a.started.cmp(&b.started).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Remove a record. A referenced worktree is removed first, best-effort.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if let Ok(session) = self.load(id) {
            if let Some(worktree_path) = session.worktree_path.as_deref() {
                if let Err(e) = self.worktrees.remove(worktree_path) {
                    tracing::warn!(
                        id = %id,
                        path = %worktree_path.display(),
                        error = %e,
                        "Failed to remove worktree, deleting record anyway"
                    );
                }
            }
        }

        let path = self.record_path(id);
        let _guard = self.lock_records();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(id = %id, "Deleted session record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
