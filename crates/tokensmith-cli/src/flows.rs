use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tokensmith_session::{
    GitClient, OrchestratorConfig, RollbackManager, RollbackOptions, SessionOrchestrator,
};
use tokensmith_store::StoreLayout;

use crate::collab::{
    CommandHook, CommandTranspiler, PlanFilePlanner, StdinApprovalProvider, StructuralValidator,
    SummaryDiffRenderer,
};
use crate::config::{load_file_config, resolve_registry_path, FileConfig};
use crate::render::{
    current_output_style, finish_spinner, format_cleanup_lines, format_preview_lines,
    format_rollback_outcome_lines, format_rollback_point_lines, format_session_outcome_lines,
    print_lines, print_status, render_status_line, start_step_spinner,
};

pub(crate) struct MutateRequest {
    pub intent: String,
    pub plan_path: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub auto_approve: bool,
    pub dry_run: bool,
    pub non_interactive: bool,
    pub no_transpile: bool,
    pub no_deploy: bool,
    pub transpile_targets: Vec<String>,
    pub enable_git: bool,
    pub no_git: bool,
    pub json: bool,
    pub verbose: bool,
}

pub(crate) struct RollbackRequest {
    pub registry_path: Option<PathBuf>,
    pub source: String,
    pub output_path: Option<PathBuf>,
    pub no_backup: bool,
    pub no_validate: bool,
    pub list: bool,
    pub cleanup: bool,
    pub keep: Option<usize>,
    pub json: bool,
    pub verbose: bool,
}

pub(crate) fn build_orchestrator_config(
    request: &MutateRequest,
    file_config: &FileConfig,
) -> Result<OrchestratorConfig> {
    let registry_path = resolve_registry_path(request.registry_path.clone(), file_config);
    let mut config = OrchestratorConfig::new(registry_path);
    config.state_root = file_config.state_root.clone();
    config.auto_approve = request.auto_approve;
    config.interactive = !request.non_interactive;
    config.dry_run = request.dry_run;
    if let Some(risk) = file_config.max_auto_approve_risk()? {
        config.max_auto_approve_risk = risk;
    }
    config.transpile_enabled = !request.no_transpile;
    config.transpile_targets = if request.transpile_targets.is_empty() {
        file_config.transpile_targets.clone().unwrap_or_default()
    } else {
        request.transpile_targets.clone()
    };
    config.deploy_enabled = !request.no_deploy;
    config.git_enabled = if request.no_git {
        false
    } else {
        request.enable_git || file_config.git_enabled.unwrap_or(false)
    };
    Ok(config)
}

pub(crate) fn run_mutate_command(request: MutateRequest) -> Result<()> {
    let style = current_output_style();
    let file_config = load_file_config(None)?;
    let config = build_orchestrator_config(&request, &file_config)?;
    let git_enabled = config.git_enabled;

    if request.verbose {
        print_status(
            style,
            "step",
            &format!("registry: {}", config.registry_path.display()),
        );
        print_status(
            style,
            "step",
            &format!("state root: {}", config.store_layout().root().display()),
        );
    }

    let planner = PlanFilePlanner::new(request.plan_path.clone());
    let renderer = SummaryDiffRenderer;
    let transpiler = file_config
        .transpile_command
        .as_ref()
        .map(|command| CommandTranspiler::new(command.clone()));
    let git_client = GitClient::new(".");
    let publish_hook = file_config
        .publish_command
        .as_ref()
        .map(|command| CommandHook::new("publish", command.clone()));
    let docs_hook = file_config
        .docs_command
        .as_ref()
        .map(|command| CommandHook::new("docs", command.clone()));

    let mut orchestrator = SessionOrchestrator::new(config, &planner, &renderer);
    if let Some(transpiler) = &transpiler {
        orchestrator = orchestrator.with_transpiler(transpiler);
    }
    if git_enabled {
        orchestrator = orchestrator.with_version_control(&git_client);
    }
    if let Some(hook) = &publish_hook {
        orchestrator = orchestrator.with_deploy_hook(hook);
    }
    if let Some(hook) = &docs_hook {
        orchestrator = orchestrator.with_deploy_hook(hook);
    }

    let spinner = if request.non_interactive || request.auto_approve {
        start_step_spinner(style, "mutating registry")
    } else {
        None
    };
    let mut provider = StdinApprovalProvider;
    let outcome = orchestrator.run(&request.intent, &mut provider)?;
    finish_spinner(spinner);

    if request.json {
        println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    } else {
        if request.dry_run || request.verbose {
            if let Some(preview) = &outcome.preview {
                print_lines(&format_preview_lines(preview));
            }
        }
        print_lines(&format_session_outcome_lines(&outcome));
    }

    if !outcome.success {
        return Err(anyhow!(outcome
            .failure
            .unwrap_or_else(|| "session failed".to_string())));
    }
    Ok(())
}

pub(crate) fn run_rollback_command(request: RollbackRequest) -> Result<()> {
    let style = current_output_style();
    let file_config = load_file_config(None)?;
    let registry_path = resolve_registry_path(request.registry_path.clone(), &file_config);
    let layout = match &file_config.state_root {
        Some(root) => StoreLayout::new(root.clone()),
        None => StoreLayout::for_registry(&registry_path),
    };

    if request.verbose {
        print_status(
            style,
            "step",
            &format!("state root: {}", layout.root().display()),
        );
    }

    let validator = StructuralValidator;
    let manager = RollbackManager::new(&registry_path, &layout, &validator);

    if request.list {
        let points = manager.list()?;
        if request.json {
            println!("{}", serde_json::to_string_pretty(&points)?);
        } else {
            print_lines(&format_rollback_point_lines(&points));
        }
        return Ok(());
    }

    if request.cleanup {
        let keep = request.keep.or(file_config.backup_keep);
        let outcome = manager.cleanup(keep)?;
        if request.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_lines(&format_cleanup_lines(&outcome));
        }
        return Ok(());
    }

    let options = RollbackOptions {
        no_backup: request.no_backup,
        no_validate: request.no_validate,
    };
    let outcome = manager.rollback(&request.source, request.output_path.as_deref(), &options)?;

    for warning in &outcome.warnings {
        eprintln!("{}", render_status_line(style, "warn", warning));
    }
    if request.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_lines(&format_rollback_outcome_lines(&outcome));
        print_status(style, "ok", "rollback complete");
    }
    Ok(())
}
