mod patch;
mod undo;

pub use patch::{apply_patch, ApplyMode, PatchFailure, PatchOutcome};
pub use undo::generate_undo;

use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;


#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument {
    value: Value,
}

impl RegistryDocument {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).context("failed parsing registry document")?;
        if !value.is_object() {
            return Err(anyhow!("registry document root must be a JSON object"));
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn to_pretty_string(&self) -> Result<String> {
        let mut rendered = serde_json::to_string_pretty(&self.value)
            .context("failed serializing registry document")?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn component_names(&self) -> Vec<String> {
        let Some(components) = self.value.get("components").and_then(Value::as_array) else {
            return Vec::new();
        };
        components
            .iter()
            .filter_map(|component| component.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.value
            .get("components")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn token_count(&self) -> usize {
        let Some(categories) = self.value.get("tokens").and_then(Value::as_object) else {
            return 0;
        };
        categories
            .values()
            .filter_map(Value::as_object)
            .map(serde_json::Map::len)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(anyhow!("invalid risk level: {value}")),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
}

impl PatchOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path: path.into(),
            value: Some(value),
        }
    }
}

pub type UndoPatch = Vec<PatchOperation>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    #[serde(alias = "riskLevel")]
    pub risk_level: RiskLevel,
    #[serde(default, alias = "componentsAffected")]
    pub components_affected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPlan {
    pub operations: Vec<PatchOperation>,
    pub metadata: PlanMetadata,
}

impl MutationPlan {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed parsing mutation plan")
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.metadata.risk_level
    }
}
