use anyhow::Result;
use serde_json::Value;

use crate::patch::{apply_one, split_path};
use crate::{PatchOpKind, PatchOperation, UndoPatch};

pub fn generate_undo(operations: &[PatchOperation], original: &Value) -> Result<UndoPatch> {
    // Prior values are snapshotted against the original document before any
    // operation in the batch is applied.
    let prior_values: Vec<Option<Value>> = operations
        .iter()
        .map(|operation| match operation.op {
            PatchOpKind::Remove | PatchOpKind::Replace => {
                original.pointer(&operation.path).cloned()
            }
            PatchOpKind::Add => None,
        })
        .collect();

    let mut scratch = original.clone();
    let mut inverses: Vec<PatchOperation> = Vec::new();

    for (index, operation) in operations.iter().enumerate() {
        let inverse = match operation.op {
            PatchOpKind::Add => {
                resolve_append_path(&scratch, &operation.path).map(PatchOperation::remove)
            }
            PatchOpKind::Remove => prior_values[index]
                .clone()
                .map(|value| PatchOperation::add(operation.path.clone(), value)),
            PatchOpKind::Replace => prior_values[index]
                .clone()
                .map(|value| PatchOperation::replace(operation.path.clone(), value)),
        };

        // Operations that fail to apply contribute no undo entry; the undo
        // patch only covers operations that actually took effect.
        if apply_one(&mut scratch, operation).is_err() {
            continue;
        }
        if let Some(inverse) = inverse {
            inverses.push(inverse);
        }
    }

    inverses.reverse();
    Ok(inverses)
}

fn resolve_append_path(scratch: &Value, path: &str) -> Option<String> {
    let (parent_path, raw_token) = split_path(path).ok()?;
    if raw_token != "-" {
        return Some(path.to_string());
    }
    let items = scratch.pointer(parent_path)?.as_array()?;
    Some(format!("{parent_path}/{}", items.len()))
}
