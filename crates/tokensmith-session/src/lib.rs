mod approval;
mod git;
mod orchestrator;
mod rollback;

pub use approval::{ApprovalDecision, ApprovalGate, ApprovalOptions, ApprovalProvider, PromptAnswer};
pub use git::GitClient;
pub use orchestrator::{SessionOrchestrator, SessionOutcome, SubActionResult};
pub use rollback::{
    RollbackManager, RollbackOptions, RollbackOutcome, RollbackPoint, RollbackPointKind,
};

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tokensmith_core::{MutationPlan, RegistryDocument, RiskLevel};
use tokensmith_store::StoreLayout;


pub const DEFAULT_BACKUP_KEEP: usize = 10;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub registry_path: PathBuf,
    pub state_root: Option<PathBuf>,
    pub auto_approve: bool,
    pub interactive: bool,
    pub max_auto_approve_risk: RiskLevel,
    pub dry_run: bool,
    pub skip_backup: bool,
    pub transpile_enabled: bool,
    pub transpile_targets: Vec<String>,
    pub deploy_enabled: bool,
    pub git_enabled: bool,
}

impl OrchestratorConfig {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            state_root: None,
            auto_approve: false,
            interactive: true,
            max_auto_approve_risk: RiskLevel::Low,
            dry_run: false,
            skip_backup: false,
            transpile_enabled: true,
            transpile_targets: Vec::new(),
            deploy_enabled: true,
            git_enabled: false,
        }
    }

    pub fn store_layout(&self) -> StoreLayout {
        match &self.state_root {
            Some(root) => StoreLayout::new(root.clone()),
            None => StoreLayout::for_registry(&self.registry_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewSummary {
    pub risk_level: RiskLevel,
    pub components_affected: Vec<String>,
    pub operation_count: usize,
    pub adds: usize,
    pub removes: usize,
    pub replaces: usize,
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub trait Planner {
    fn plan(&self, prompt: &str, registry: &RegistryDocument) -> Result<MutationPlan>;
}

pub trait DiffRenderer {
    fn render(
        &self,
        before: &RegistryDocument,
        after: &RegistryDocument,
        plan: &MutationPlan,
    ) -> Result<PreviewSummary>;
}

pub trait Validator {
    fn validate(&self, document: &RegistryDocument) -> Result<ValidationReport>;
}

pub trait Transpiler {
    fn transpile(&self, target: &str, registry: &RegistryDocument) -> Result<String>;
}

pub trait VersionControl {
    fn add(&self, paths: &[&Path]) -> Result<()>;
    fn commit(&self, message: &str) -> Result<String>;
    fn tag(&self, name: &str, message: &str) -> Result<()>;
}

pub trait DeployHook {
    fn name(&self) -> &str;
    fn run(&self, registry: &RegistryDocument) -> Result<String>;
}
