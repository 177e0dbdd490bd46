use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokensmith_core::RiskLevel;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "tokensmith.toml";
pub(crate) const DEFAULT_REGISTRY_PATH: &str = "./dist/registry.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub registry_path: Option<PathBuf>,
    pub state_root: Option<PathBuf>,
    pub backup_keep: Option<usize>,
    pub max_auto_approve_risk: Option<String>,
    pub transpile_targets: Option<Vec<String>>,
    pub transpile_command: Option<String>,
    pub publish_command: Option<String>,
    pub docs_command: Option<String>,
    pub git_enabled: Option<bool>,
}

impl FileConfig {
    pub fn max_auto_approve_risk(&self) -> Result<Option<RiskLevel>> {
        self.max_auto_approve_risk
            .as_deref()
            .map(RiskLevel::parse)
            .transpose()
            .context("invalid max_auto_approve_risk in config file")
    }
}

pub(crate) fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed reading config file: {}", path.display()));
        }
    };
    toml::from_str(&raw).with_context(|| format!("failed parsing config file: {}", path.display()))
}

pub(crate) fn resolve_registry_path(
    cli_value: Option<PathBuf>,
    file_config: &FileConfig,
) -> PathBuf {
    cli_value
        .or_else(|| file_config.registry_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH))
}
