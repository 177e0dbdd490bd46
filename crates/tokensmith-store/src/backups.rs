use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{current_unix_timestamp, StoreLayout};

const BACKUP_PREFIX: &str = "registry-";
const BACKUP_EXTENSION: &str = ".json";
const META_EXTENSION: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub file_name: String,
    pub created_at_unix: u64,
    pub sequence: u64,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneOutcome {
    pub removed: usize,
    pub retained: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupMetaFile {
    version: u32,
    registry_path: String,
    created_at_unix: u64,
    sha256: String,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    backups_dir: PathBuf,
}

impl BackupStore {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            backups_dir: layout.backups_dir(),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    pub fn create_backup(&self, registry_path: &Path) -> Result<Backup> {
        let contents = fs::read(registry_path).with_context(|| {
            format!(
                "failed reading registry for backup: {}",
                registry_path.display()
            )
        })?;
        fs::create_dir_all(&self.backups_dir)
            .with_context(|| format!("failed to create {}", self.backups_dir.display()))?;

        let stamp = current_unix_timestamp()?;
        let (path, sequence) = self.claim_backup_file(stamp, &contents)?;
        let digest = sha256_hex(&contents);

        let meta = BackupMetaFile {
            version: 1,
            registry_path: registry_path.display().to_string(),
            created_at_unix: stamp,
            sha256: digest.clone(),
        };
        let meta_path = meta_path_for(&path);
        let rendered = serde_json::to_string_pretty(&meta)
            .with_context(|| format!("failed serializing backup metadata: {}", meta_path.display()))?;
        fs::write(&meta_path, rendered)
            .with_context(|| format!("failed writing backup metadata: {}", meta_path.display()))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Backup {
            path,
            file_name,
            created_at_unix: stamp,
            sequence,
            sha256: Some(digest),
        })
    }

    fn claim_backup_file(&self, stamp: u64, contents: &[u8]) -> Result<(PathBuf, u64)> {
        let mut sequence = 0_u64;
        loop {
            let candidate = self.backups_dir.join(backup_file_name(stamp, sequence));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    file.write_all(contents).with_context(|| {
                        format!("failed writing backup file: {}", candidate.display())
                    })?;
                    file.flush().with_context(|| {
                        format!("failed flushing backup file: {}", candidate.display())
                    })?;
                    return Ok((candidate, sequence));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    sequence += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed creating backup file: {}", candidate.display())
                    });
                }
            }
        }
    }

    pub fn list_backups(&self) -> Result<Vec<Backup>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed reading backup directory: {}", self.backups_dir.display())
                });
            }
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed reading backup directory: {}", self.backups_dir.display())
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some((stamp, sequence)) = parse_backup_file_name(&file_name) else {
                continue;
            };
            let path = entry.path();
            let sha256 = read_meta_sha256(&meta_path_for(&path));
            backups.push(Backup {
                path,
                file_name,
                created_at_unix: stamp,
                sequence,
                sha256,
            });
        }

        backups.sort_by(|a, b| {
            (b.created_at_unix, b.sequence).cmp(&(a.created_at_unix, a.sequence))
        });
        Ok(backups)
    }

    pub fn resolve_last(&self) -> Result<Backup> {
        self.list_backups()?.into_iter().next().ok_or_else(|| {
            anyhow!(
                "no backup found in {}; nothing to roll back to",
                self.backups_dir.display()
            )
        })
    }

    pub fn prune(&self, keep: usize) -> Result<PruneOutcome> {
        let backups = self.list_backups()?;
        let mut retained = backups.len().min(keep);
        let mut removed = 0_usize;
        let mut failures = Vec::new();

        for backup in backups.into_iter().skip(keep) {
            match fs::remove_file(&backup.path) {
                Ok(()) => {
                    removed += 1;
                    let meta_path = meta_path_for(&backup.path);
                    if meta_path.exists() {
                        if let Err(err) = fs::remove_file(&meta_path) {
                            failures.push(format!("{}: {err}", meta_path.display()));
                        }
                    }
                }
                Err(err) => {
                    // The file is still on disk, so it still counts as retained.
                    retained += 1;
                    failures.push(format!("{}: {err}", backup.path.display()));
                }
            }
        }

        Ok(PruneOutcome {
            removed,
            retained,
            failures,
        })
    }

    pub fn verify_backup(&self, backup: &Backup) -> Result<Option<bool>> {
        let Some(expected) = &backup.sha256 else {
            return Ok(None);
        };
        let contents = fs::read(&backup.path)
            .with_context(|| format!("failed reading backup file: {}", backup.path.display()))?;
        Ok(Some(&sha256_hex(&contents) == expected))
    }
}

pub(crate) fn sha256_hex(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hex::encode(hasher.finalize())
}

fn backup_file_name(stamp: u64, sequence: u64) -> String {
    if sequence == 0 {
        format!("{BACKUP_PREFIX}{stamp:010}{BACKUP_EXTENSION}")
    } else {
        format!("{BACKUP_PREFIX}{stamp:010}-{sequence}{BACKUP_EXTENSION}")
    }
}

fn parse_backup_file_name(file_name: &str) -> Option<(u64, u64)> {
    let stem = file_name
        .strip_prefix(BACKUP_PREFIX)?
        .strip_suffix(BACKUP_EXTENSION)?;
    if stem.ends_with(".meta") {
        return None;
    }
    match stem.split_once('-') {
        Some((stamp, sequence)) => {
            Some((stamp.parse().ok()?, sequence.parse().ok()?))
        }
        None => Some((stem.parse().ok()?, 0)),
    }
}

fn meta_path_for(backup_path: &Path) -> PathBuf {
    let file_name = backup_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(BACKUP_EXTENSION)
        .unwrap_or(&file_name);
    backup_path.with_file_name(format!("{stem}{META_EXTENSION}"))
}

fn read_meta_sha256(meta_path: &Path) -> Option<String> {
    let raw = fs::read_to_string(meta_path).ok()?;
    let meta: BackupMetaFile = serde_json::from_str(&raw).ok()?;
    Some(meta.sha256)
}
