use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokensmith_core::{apply_patch, ApplyMode, PatchOperation, RegistryDocument, UndoPatch};
use tokensmith_store::{Backup, BackupStore, PruneOutcome, StoreLayout, UndoStore};

use crate::{Validator, DEFAULT_BACKUP_KEEP};

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub no_backup: bool,
    pub no_validate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackOutcome {
    pub source_description: String,
    pub pre_rollback_backup: Option<PathBuf>,
    pub output_path: PathBuf,
    pub operations_applied: Option<usize>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPointKind {
    Backup,
    UndoSession,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackPoint {
    pub kind: RollbackPointKind,
    pub reference: String,
    pub timestamp_unix: u64,
    pub description: String,
}

enum ResolvedSource {
    Replacement {
        document: RegistryDocument,
        backup: Option<Backup>,
        description: String,
    },
    Patch {
        operations: UndoPatch,
        description: String,
    },
}

pub struct RollbackManager<'a> {
    registry_path: PathBuf,
    backup_store: BackupStore,
    undo_store: UndoStore,
    validator: &'a dyn Validator,
}

impl<'a> RollbackManager<'a> {
    pub fn new(
        registry_path: impl Into<PathBuf>,
        layout: &StoreLayout,
        validator: &'a dyn Validator,
    ) -> Self {
        Self {
            registry_path: registry_path.into(),
            backup_store: BackupStore::new(layout),
            undo_store: UndoStore::new(layout),
            validator,
        }
    }

    pub fn rollback(
        &self,
        source: &str,
        output_path: Option<&Path>,
        options: &RollbackOptions,
    ) -> Result<RollbackOutcome> {
        let resolved = self.resolve_source(source)?;
        let mut warnings = Vec::new();

        let (document, operations_applied, description) = match resolved {
            ResolvedSource::Replacement {
                document,
                backup,
                description,
            } => {
                if let Some(backup) = &backup {
                    match self.backup_store.verify_backup(backup)? {
                        Some(true) | None => {}
                        Some(false) => warnings.push(format!(
                            "backup content does not match its recorded sha256: {}",
                            backup.path.display()
                        )),
                    }
                }
                (document, None, description)
            }
            ResolvedSource::Patch {
                operations,
                description,
            } => {
                let current = self.read_current_registry()?;
                let outcome = apply_patch(current.value(), &operations, ApplyMode::AllOrNothing)
                    .with_context(|| format!("failed applying undo patch from {description}"))?;
                let applied = outcome.applied;
                (
                    RegistryDocument::new(outcome.document),
                    Some(applied),
                    description,
                )
            }
        };

        if !options.no_validate {
            let report = self
                .validator
                .validate(&document)
                .context("validation collaborator failed; registry left untouched")?;
            if !report.valid {
                warnings.push(format!(
                    "rolled-back document failed validation: {}",
                    report.errors.join("; ")
                ));
            }
        }

        let pre_rollback_backup = if options.no_backup {
            None
        } else {
            Some(self.backup_store.create_backup(&self.registry_path)?.path)
        };

        let destination = output_path.unwrap_or(&self.registry_path).to_path_buf();
        let rendered = document.to_pretty_string()?;
        fs::write(&destination, rendered)
            .with_context(|| format!("failed writing rolled-back registry: {}", destination.display()))?;

        Ok(RollbackOutcome {
            source_description: description,
            pre_rollback_backup,
            output_path: destination,
            operations_applied,
            warnings,
        })
    }

    pub fn list(&self) -> Result<Vec<RollbackPoint>> {
        let mut points = Vec::new();

        for backup in self.backup_store.list_backups()? {
            let digest = backup
                .sha256
                .as_deref()
                .map(|sha| format!(", sha256 {}", &sha[..12.min(sha.len())]))
                .unwrap_or_default();
            points.push(RollbackPoint {
                kind: RollbackPointKind::Backup,
                reference: backup.path.display().to_string(),
                timestamp_unix: backup.created_at_unix,
                description: format!("full snapshot{digest}"),
            });
        }

        for entry in self.undo_store.list()? {
            let operation_count = self
                .undo_store
                .read(&entry.session_id)?
                .map(|patch| patch.len())
                .unwrap_or(0);
            points.push(RollbackPoint {
                kind: RollbackPointKind::UndoSession,
                reference: entry.session_id,
                timestamp_unix: entry.modified_at_unix,
                description: format!("undo patch ({operation_count} operations)"),
            });
        }

        points.sort_by(|a, b| b.timestamp_unix.cmp(&a.timestamp_unix));
        Ok(points)
    }

    pub fn cleanup(&self, keep: Option<usize>) -> Result<PruneOutcome> {
        self.backup_store.prune(keep.unwrap_or(DEFAULT_BACKUP_KEEP))
    }

    fn resolve_source(&self, source: &str) -> Result<ResolvedSource> {
        if source == "last" {
            let backup = self.backup_store.resolve_last()?;
            let raw = fs::read_to_string(&backup.path)
                .with_context(|| format!("failed reading backup file: {}", backup.path.display()))?;
            let document = RegistryDocument::parse(&raw)
                .with_context(|| format!("backup file is not a valid registry: {}", backup.path.display()))?;
            let description = format!("most recent backup ({})", backup.file_name);
            return Ok(ResolvedSource::Replacement {
                document,
                backup: Some(backup),
                description,
            });
        }

        let source_path = Path::new(source);
        if source_path.exists() {
            let raw = fs::read_to_string(source_path)
                .with_context(|| format!("failed reading rollback source: {source}"))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("rollback source does not parse as JSON: {source}"))?;
            return match value {
                Value::Array(_) => {
                    let operations: Vec<PatchOperation> = serde_json::from_value(value)
                        .with_context(|| {
                            format!("rollback source is not a patch operation array: {source}")
                        })?;
                    Ok(ResolvedSource::Patch {
                        operations,
                        description: format!("undo patch file {source}"),
                    })
                }
                Value::Object(_) => Ok(ResolvedSource::Replacement {
                    document: RegistryDocument::new(value),
                    backup: None,
                    description: format!("backup file {source}"),
                }),
                _ => Err(anyhow!(
                    "rollback source must be a registry object or a patch operation array: {source}"
                )),
            };
        }

        if let Some(operations) = self.undo_store.read(source)? {
            return Ok(ResolvedSource::Patch {
                operations,
                description: format!("undo patch for session {source}"),
            });
        }

        Err(anyhow!(
            "unresolvable rollback source '{source}': not 'last', not an existing file, \
             and no undo patch recorded for that session id"
        ))
    }

    fn read_current_registry(&self) -> Result<RegistryDocument> {
        let raw = fs::read_to_string(&self.registry_path).with_context(|| {
            format!(
                "failed reading current registry: {}",
                self.registry_path.display()
            )
        })?;
        RegistryDocument::parse(&raw).with_context(|| {
            format!(
                "current registry is not valid JSON: {}",
                self.registry_path.display()
            )
        })
    }
}
