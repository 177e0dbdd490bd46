use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokensmith_core::{apply_patch, generate_undo, ApplyMode, PatchOutcome, RegistryDocument};
use tokensmith_store::{
    current_unix_timestamp, ApprovalSummary, BackupStore, BackupSummary, MutationSummary,
    SessionLog, SessionRecord, StepRecord, StepStatus, StoreLayout, UndoStore,
};

use crate::{
    ApprovalGate, ApprovalOptions, ApprovalProvider, DeployHook, DiffRenderer, OrchestratorConfig,
    Planner, PreviewSummary, Transpiler, VersionControl,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubActionResult {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubActionResult {
    fn succeeded(name: &str, detail: String) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            detail: Some(detail),
            error: None,
        }
    }

    fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            detail: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub success: bool,
    pub mutations_applied: bool,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub duration_ms: u64,
    pub failure: Option<String>,
    pub preview: Option<PreviewSummary>,
    pub approval: Option<ApprovalSummary>,
    pub backup_path: Option<PathBuf>,
    pub undo_path: Option<PathBuf>,
    pub deploy_results: Vec<SubActionResult>,
    pub record: SessionRecord,
}

struct SessionState {
    id: String,
    prompt: String,
    started: Instant,
    started_at_unix: u64,
    steps: Vec<StepRecord>,
    mutations: MutationSummary,
    approval: Option<ApprovalSummary>,
    backup: Option<BackupSummary>,
    preview: Option<PreviewSummary>,
    backup_path: Option<PathBuf>,
    undo_path: Option<PathBuf>,
    deploy_results: Vec<SubActionResult>,
    mutations_applied: bool,
    failure: Option<String>,
}

impl SessionState {
    fn new(prompt: &str) -> Result<Self> {
        let started_at_unix = current_unix_timestamp()?;
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system time is before unix epoch")?
            .subsec_nanos();
        Ok(Self {
            id: format!("session-{started_at_unix}-{nanos:09}"),
            prompt: prompt.to_string(),
            started: Instant::now(),
            started_at_unix,
            steps: Vec::new(),
            mutations: MutationSummary::default(),
            approval: None,
            backup: None,
            preview: None,
            backup_path: None,
            undo_path: None,
            deploy_results: Vec::new(),
            mutations_applied: false,
            failure: None,
        })
    }

    fn finalize(&self) -> SessionRecord {
        let completed_steps = self
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count();
        let failed_steps = self
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .count();
        SessionRecord {
            session_id: self.id.clone(),
            timestamp_unix: self.started_at_unix,
            prompt: self.prompt.clone(),
            success: failed_steps == 0 && self.failure.is_none(),
            mutations_applied: self.mutations_applied,
            completed_steps,
            failed_steps,
            duration_ms: self.started.elapsed().as_millis() as u64,
            steps: self.steps.clone(),
            mutations: self.mutations.clone(),
            approval: self.approval.clone(),
            backup: self.backup.clone(),
        }
    }
}

fn run_step<T>(
    steps: &mut Vec<StepRecord>,
    name: &str,
    action: impl FnOnce() -> Result<(T, Option<String>)>,
) -> Result<T> {
    let started_at_unix = current_unix_timestamp()?;
    let started = Instant::now();
    match action() {
        Ok((value, detail)) => {
            steps.push(StepRecord {
                name: name.to_string(),
                status: StepStatus::Completed,
                detail,
                error: None,
                started_at_unix,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            Ok(value)
        }
        Err(err) => {
            steps.push(StepRecord {
                name: name.to_string(),
                status: StepStatus::Failed,
                detail: None,
                error: Some(format!("{err:#}")),
                started_at_unix,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            Err(err)
        }
    }
}

pub struct SessionOrchestrator<'a> {
    config: OrchestratorConfig,
    planner: &'a dyn Planner,
    diff_renderer: &'a dyn DiffRenderer,
    transpiler: Option<&'a dyn Transpiler>,
    version_control: Option<&'a dyn VersionControl>,
    deploy_hooks: Vec<&'a dyn DeployHook>,
}

impl<'a> SessionOrchestrator<'a> {
    pub fn new(
        config: OrchestratorConfig,
        planner: &'a dyn Planner,
        diff_renderer: &'a dyn DiffRenderer,
    ) -> Self {
        Self {
            config,
            planner,
            diff_renderer,
            transpiler: None,
            version_control: None,
            deploy_hooks: Vec::new(),
        }
    }

    pub fn with_transpiler(mut self, transpiler: &'a dyn Transpiler) -> Self {
        self.transpiler = Some(transpiler);
        self
    }

    pub fn with_version_control(mut self, version_control: &'a dyn VersionControl) -> Self {
        self.version_control = Some(version_control);
        self
    }

    pub fn with_deploy_hook(mut self, hook: &'a dyn DeployHook) -> Self {
        self.deploy_hooks.push(hook);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn run(&self, prompt: &str, provider: &mut dyn ApprovalProvider) -> Result<SessionOutcome> {
        let layout = self.config.store_layout();
        layout.ensure_base_dirs()?;

        let mut state = SessionState::new(prompt)?;
        if let Err(err) = self.execute(&mut state, provider, &layout) {
            state.failure = Some(format!("{err:#}"));
        }

        let record = state.finalize();
        SessionLog::new(layout.session_log_path()).append(&record)?;

        Ok(SessionOutcome {
            session_id: state.id,
            success: record.success,
            mutations_applied: record.mutations_applied,
            completed_steps: record.completed_steps,
            failed_steps: record.failed_steps,
            duration_ms: record.duration_ms,
            failure: state.failure,
            preview: state.preview,
            approval: state.approval,
            backup_path: state.backup_path,
            undo_path: state.undo_path,
            deploy_results: state.deploy_results,
            record,
        })
    }

    fn execute(
        &self,
        state: &mut SessionState,
        provider: &mut dyn ApprovalProvider,
        layout: &StoreLayout,
    ) -> Result<()> {
        let registry_path = self.config.registry_path.clone();
        let session_id = state.id.clone();
        let prompt = state.prompt.clone();

        let before = run_step(&mut state.steps, "load_context", || {
            let raw = fs::read_to_string(&registry_path).with_context(|| {
                format!(
                    "no registry at {}; run the extract step first",
                    registry_path.display()
                )
            })?;
            let document = RegistryDocument::parse(&raw).with_context(|| {
                format!(
                    "registry at {} is not valid JSON; re-run the extract step",
                    registry_path.display()
                )
            })?;
            let detail = format!(
                "{} components, {} tokens",
                document.component_count(),
                document.token_count()
            );
            Ok((document, Some(detail)))
        })?;

        let plan = run_step(&mut state.steps, "plan_mutations", || {
            let plan = self.planner.plan(&prompt, &before)?;
            let detail = format!(
                "{} operations, risk {}",
                plan.operations.len(),
                plan.risk_level()
            );
            Ok((plan, Some(detail)))
        })?;
        state.mutations.planned = plan.operations.len();
        state.mutations.risk_level = Some(plan.risk_level());
        state.mutations.components_affected = plan.metadata.components_affected.clone();

        if plan.is_empty() {
            return Ok(());
        }

        let (preview, dry_outcome): (PreviewSummary, PatchOutcome) =
            run_step(&mut state.steps, "preview_changes", || {
                let outcome = apply_patch(before.value(), &plan.operations, ApplyMode::BestEffort)?;
                let after = RegistryDocument::new(outcome.document.clone());
                let mut preview = self.diff_renderer.render(&before, &after, &plan)?;
                for failure in &outcome.failures {
                    preview.failures.push(format!(
                        "operation {} ({} {}): {}",
                        failure.index,
                        failure.op.as_str(),
                        failure.path,
                        failure.reason
                    ));
                }
                let detail = format!(
                    "{} applied, {} unresolvable",
                    outcome.applied,
                    outcome.failures.len()
                );
                Ok(((preview, outcome), Some(detail)))
            })?;
        state.preview = Some(preview.clone());

        if self.config.dry_run {
            return Ok(());
        }

        let decision = run_step(&mut state.steps, "get_approval", || {
            let options = ApprovalOptions {
                auto_approve: self.config.auto_approve,
                interactive: self.config.interactive,
                max_auto_approve_risk: self.config.max_auto_approve_risk,
            };
            let decision = ApprovalGate::decide(&plan, &preview, &options, provider)?;
            let detail = decision.reason.clone();
            Ok((decision, Some(detail)))
        })?;
        state.approval = Some(ApprovalSummary {
            approved: decision.approved,
            method: decision.method,
            reason: decision.reason,
        });
        if !decision.approved {
            return Ok(());
        }

        let applied_document = run_step(&mut state.steps, "apply_mutations", || {
            let backup = if self.config.skip_backup {
                None
            } else {
                Some(BackupStore::new(layout).create_backup(&registry_path)?)
            };
            let undo = generate_undo(&plan.operations, before.value())?;
            let document = RegistryDocument::new(dry_outcome.document.clone());
            fs::write(&registry_path, document.to_pretty_string()?).with_context(|| {
                format!("failed writing registry: {}", registry_path.display())
            })?;
            let undo_path = UndoStore::new(layout).write(&session_id, &undo)?;
            let detail = format!(
                "{} operations applied, undo patch {}",
                dry_outcome.applied,
                undo_path.display()
            );
            Ok(((backup, document, undo_path), Some(detail)))
        })?;
        let (backup, applied_document, undo_path) = applied_document;
        state.mutations.applied = dry_outcome.applied;
        state.mutations.failed = dry_outcome.failures.len();
        state.mutations_applied = true;
        state.backup = Some(BackupSummary {
            created: backup.is_some(),
            path: backup
                .as_ref()
                .map(|backup| backup.path.display().to_string()),
        });
        state.backup_path = backup.map(|backup| backup.path);
        state.undo_path = Some(undo_path.clone());

        if self.config.transpile_enabled && !self.config.transpile_targets.is_empty() {
            if let Some(transpiler) = self.transpiler {
                run_step(&mut state.steps, "transpile", || {
                    let mut details = Vec::new();
                    for target in &self.config.transpile_targets {
                        let detail =
                            transpiler.transpile(target, &applied_document).with_context(
                                || format!("transpile failed for target '{target}'"),
                            )?;
                        details.push(format!("{target}: {detail}"));
                    }
                    Ok(((), Some(details.join("; "))))
                })?;
            }
        }

        let git_active = self.config.git_enabled && self.version_control.is_some();
        if self.config.deploy_enabled && (git_active || !self.deploy_hooks.is_empty()) {
            let results = run_step(&mut state.steps, "deploy", || {
                let mut results = Vec::new();
                if git_active {
                    if let Some(version_control) = self.version_control {
                        results.extend(run_git_sub_actions(
                            version_control,
                            &registry_path,
                            &undo_path,
                            &session_id,
                            &prompt,
                            dry_outcome.applied,
                            &plan.metadata.components_affected,
                        ));
                    }
                }
                for hook in &self.deploy_hooks {
                    match hook.run(&applied_document) {
                        Ok(detail) => results.push(SubActionResult::succeeded(hook.name(), detail)),
                        Err(err) => {
                            results.push(SubActionResult::failed(hook.name(), format!("{err:#}")))
                        }
                    }
                }
                let succeeded = results.iter().filter(|result| result.success).count();
                let detail = format!("{succeeded}/{} sub-actions succeeded", results.len());
                Ok((results, Some(detail)))
            })?;
            state.deploy_results = results;
        }

        Ok(())
    }
}

fn run_git_sub_actions(
    version_control: &dyn VersionControl,
    registry_path: &Path,
    undo_path: &Path,
    session_id: &str,
    prompt: &str,
    mutation_count: usize,
    components_affected: &[String],
) -> Vec<SubActionResult> {
    let mut results = Vec::new();
    let components = if components_affected.is_empty() {
        "none".to_string()
    } else {
        components_affected.join(", ")
    };
    let message = format!(
        "tokensmith: {prompt}\n\nsession: {session_id}\nmutations: {mutation_count}\ncomponents: {components}"
    );

    let commit = (|| -> Result<String> {
        version_control.add(&[registry_path, undo_path])?;
        version_control.commit(&message)
    })();

    match commit {
        Ok(hash) => {
            results.push(SubActionResult::succeeded(
                "git_commit",
                format!("commit {hash}"),
            ));
            let tag_name = format!("tokensmith/{session_id}");
            match version_control.tag(&tag_name, &message) {
                Ok(()) => {
                    results.push(SubActionResult::succeeded("git_tag", tag_name));
                }
                Err(err) => results.push(SubActionResult::failed("git_tag", format!("{err:#}"))),
            }
        }
        Err(err) => {
            results.push(SubActionResult::failed("git_commit", format!("{err:#}")));
            results.push(SubActionResult::failed(
                "git_tag",
                "skipped: commit failed".to_string(),
            ));
        }
    }

    results
}
