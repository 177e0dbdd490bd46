mod backups;
mod session_log;
mod undo_store;

pub use backups::{Backup, BackupStore, PruneOutcome};
pub use session_log::{
    ApprovalMethod, ApprovalSummary, BackupSummary, MutationSummary, SessionLog, SessionRecord,
    StepRecord, StepStatus,
};
pub use undo_store::{UndoEntry, UndoStore};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_registry(registry_path: &Path) -> Self {
        let parent = registry_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: parent.join(".tokensmith"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn undo_dir(&self) -> PathBuf {
        self.root.join("undo")
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.root.join("sessions.log")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.backups_dir(), self.undo_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
