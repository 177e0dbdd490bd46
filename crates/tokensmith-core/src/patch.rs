use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::{PatchOpKind, PatchOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    BestEffort,
    AllOrNothing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchFailure {
    pub index: usize,
    pub op: PatchOpKind,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub document: Value,
    pub applied: usize,
    pub failures: Vec<PatchFailure>,
}

impl PatchOutcome {
    pub fn succeeded_operations(&self, operations: &[PatchOperation]) -> Vec<PatchOperation> {
        operations
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.failures.iter().any(|failure| failure.index == *index))
            .map(|(_, operation)| operation.clone())
            .collect()
    }
}

pub fn apply_patch(
    document: &Value,
    operations: &[PatchOperation],
    mode: ApplyMode,
) -> Result<PatchOutcome> {
    let mut working = document.clone();
    let mut applied = 0_usize;
    let mut failures = Vec::new();

    for (index, operation) in operations.iter().enumerate() {
        match apply_one(&mut working, operation) {
            Ok(()) => applied += 1,
            Err(reason) => {
                if mode == ApplyMode::AllOrNothing {
                    return Err(anyhow!(
                        "patch operation {index} ({} {}) failed: {reason}",
                        operation.op.as_str(),
                        operation.path
                    ));
                }
                failures.push(PatchFailure {
                    index,
                    op: operation.op,
                    path: operation.path.clone(),
                    reason,
                });
            }
        }
    }

    Ok(PatchOutcome {
        document: working,
        applied,
        failures,
    })
}

pub(crate) fn apply_one(document: &mut Value, operation: &PatchOperation) -> Result<(), String> {
    let (parent_path, raw_token) = split_path(&operation.path)?;
    let token = decode_token(raw_token);
    let parent = document
        .pointer_mut(parent_path)
        .ok_or_else(|| format!("parent path not found: {}", display_parent(parent_path)))?;

    match operation.op {
        PatchOpKind::Add => {
            let value = operation
                .value
                .clone()
                .ok_or_else(|| "add requires a value".to_string())?;
            match parent {
                Value::Object(map) => {
                    if map.contains_key(&token) {
                        return Err(format!(
                            "value already exists at {}; use replace",
                            operation.path
                        ));
                    }
                    map.insert(token, value);
                }
                Value::Array(items) => {
                    if token == "-" {
                        items.push(value);
                    } else {
                        let index = parse_index(&token)?;
                        if index > items.len() {
                            return Err(format!(
                                "array index {index} out of bounds (len {})",
                                items.len()
                            ));
                        }
                        items.insert(index, value);
                    }
                }
                _ => return Err(container_mismatch(parent_path)),
            }
        }
        PatchOpKind::Remove => match parent {
            Value::Object(map) => {
                if map.remove(&token).is_none() {
                    return Err(format!("no value at path: {}", operation.path));
                }
            }
            Value::Array(items) => {
                let index = parse_index(&token)?;
                if index >= items.len() {
                    return Err(format!(
                        "array index {index} out of bounds (len {})",
                        items.len()
                    ));
                }
                items.remove(index);
            }
            _ => return Err(container_mismatch(parent_path)),
        },
        PatchOpKind::Replace => {
            let value = operation
                .value
                .clone()
                .ok_or_else(|| "replace requires a value".to_string())?;
            match parent {
                Value::Object(map) => {
                    let slot = map
                        .get_mut(&token)
                        .ok_or_else(|| format!("no value at path: {}", operation.path))?;
                    *slot = value;
                }
                Value::Array(items) => {
                    let index = parse_index(&token)?;
                    let len = items.len();
                    let slot = items.get_mut(index).ok_or_else(|| {
                        format!("array index {index} out of bounds (len {len})")
                    })?;
                    *slot = value;
                }
                _ => return Err(container_mismatch(parent_path)),
            }
        }
    }

    Ok(())
}

pub(crate) fn split_path(path: &str) -> Result<(&str, &str), String> {
    if path.is_empty() {
        return Err("patch path must not be empty".to_string());
    }
    if !path.starts_with('/') {
        return Err(format!("patch path must start with '/': {path}"));
    }
    let Some(split_at) = path.rfind('/') else {
        return Err(format!("patch path must start with '/': {path}"));
    };
    Ok((&path[..split_at], &path[split_at + 1..]))
}

pub(crate) fn decode_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn parse_index(token: &str) -> Result<usize, String> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(format!("invalid array index: {token}"));
    }
    token
        .parse::<usize>()
        .map_err(|_| format!("invalid array index: {token}"))
}

fn container_mismatch(parent_path: &str) -> String {
    format!(
        "value at {} is not an object or array",
        display_parent(parent_path)
    )
}

fn display_parent(parent_path: &str) -> &str {
    if parent_path.is_empty() {
        "document root"
    } else {
        parent_path
    }
}
