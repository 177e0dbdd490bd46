use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use tokensmith_core::UndoPatch;

use crate::StoreLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub session_id: String,
    pub path: PathBuf,
    pub modified_at_unix: u64,
}

#[derive(Debug, Clone)]
pub struct UndoStore {
    undo_dir: PathBuf,
}

impl UndoStore {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            undo_dir: layout.undo_dir(),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.undo_dir.join(format!("{session_id}.json"))
    }

    pub fn write(&self, session_id: &str, patch: &UndoPatch) -> Result<PathBuf> {
        fs::create_dir_all(&self.undo_dir)
            .with_context(|| format!("failed to create {}", self.undo_dir.display()))?;
        let path = self.path_for(session_id);
        let rendered = serde_json::to_string_pretty(patch)
            .with_context(|| format!("failed serializing undo patch: {session_id}"))?;
        fs::write(&path, rendered)
            .with_context(|| format!("failed writing undo patch: {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, session_id: &str) -> Result<Option<UndoPatch>> {
        let path = self.path_for(session_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading undo patch: {}", path.display()));
            }
        };
        let patch: UndoPatch = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing undo patch: {}", path.display()))?;
        Ok(Some(patch))
    }

    pub fn list(&self) -> Result<Vec<UndoEntry>> {
        let entries = match fs::read_dir(&self.undo_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed reading undo directory: {}", self.undo_dir.display())
                });
            }
        };

        let mut undo_entries = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed reading undo directory: {}", self.undo_dir.display())
            })?;
            let path = entry.path();
            let Some(session_id) = undo_session_id(&path) else {
                continue;
            };
            undo_entries.push(UndoEntry {
                session_id,
                modified_at_unix: file_modified_unix(&entry)?,
                path,
            });
        }

        undo_entries.sort_by(|a, b| {
            (b.modified_at_unix, b.session_id.clone()).cmp(&(a.modified_at_unix, a.session_id.clone()))
        });
        Ok(undo_entries)
    }
}

fn undo_session_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

fn file_modified_unix(entry: &fs::DirEntry) -> Result<u64> {
    let metadata = entry.metadata().with_context(|| {
        format!("failed reading undo file metadata: {}", entry.path().display())
    })?;
    let modified = metadata.modified().with_context(|| {
        format!("failed reading undo file mtime: {}", entry.path().display())
    })?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0))
}
