use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use tokensmith_core::{RegistryDocument, RiskLevel};
use tokensmith_session::{DiffRenderer, Planner, Validator};

use crate::collab::{
    parse_prompt_answer, split_command, ParsedAnswer, PlanFilePlanner, StructuralValidator,
    SummaryDiffRenderer,
};
use crate::config::{load_file_config, resolve_registry_path, FileConfig};
use crate::flows::{build_orchestrator_config, MutateRequest};
use crate::render::{
    format_rollback_point_lines, render_status_line, OutputStyle,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time must be after unix epoch")
        .subsec_nanos();
    let counter = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "tokensmith-cli-test-{}-{nanos}-{counter}",
        std::process::id()
    ))
}

fn sample_registry() -> RegistryDocument {
    RegistryDocument::new(json!({
        "components": [
            { "name": "Button", "props": { "variant": { "values": ["primary"] } } },
            { "name": "Card" }
        ],
        "tokens": { "color": { "primary": "#336699" } }
    }))
}

fn mutate_request() -> MutateRequest {
    MutateRequest {
        intent: "add ghost variant".to_string(),
        plan_path: None,
        registry_path: None,
        auto_approve: false,
        dry_run: false,
        non_interactive: false,
        no_transpile: false,
        no_deploy: false,
        transpile_targets: Vec::new(),
        enable_git: false,
        no_git: false,
        json: false,
        verbose: false,
    }
}

#[test]
fn prompt_answers_parse_short_and_long_forms() {
    assert_eq!(parse_prompt_answer("a"), Some(ParsedAnswer::Apply));
    assert_eq!(parse_prompt_answer(" Apply \n"), Some(ParsedAnswer::Apply));
    assert_eq!(parse_prompt_answer("c"), Some(ParsedAnswer::Cancel));
    assert_eq!(parse_prompt_answer("quit"), Some(ParsedAnswer::Cancel));
    assert_eq!(parse_prompt_answer("s"), Some(ParsedAnswer::SavePreview));
    assert_eq!(parse_prompt_answer("maybe"), None);
}

#[test]
fn split_command_separates_program_and_args() {
    let (program, args) = split_command("npm run docs:build").expect("must split");
    assert_eq!(program, "npm");
    assert_eq!(args, vec!["run", "docs:build"]);

    assert!(split_command("   ").is_err());
}

#[test]
fn structural_validator_accepts_well_formed_registry() {
    let report = StructuralValidator
        .validate(&sample_registry())
        .expect("must validate");
    assert!(report.valid);
    assert!(report.errors.is_empty());
}

#[test]
fn structural_validator_flags_duplicate_component_names() {
    let document = RegistryDocument::new(json!({
        "components": [{ "name": "Button" }, { "name": "Button" }],
        "tokens": {}
    }));
    let report = StructuralValidator
        .validate(&document)
        .expect("must validate");
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|error| error.contains("duplicate component name: Button")));
}

#[test]
fn structural_validator_flags_malformed_tokens() {
    let document = RegistryDocument::new(json!({
        "components": [],
        "tokens": { "color": "not an object" }
    }));
    let report = StructuralValidator
        .validate(&document)
        .expect("must validate");
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|error| error.contains("token category 'color'")));
}

#[test]
fn summary_renderer_counts_operations_by_kind() {
    let before = sample_registry();
    let after = sample_registry();
    let plan = tokensmith_core::MutationPlan::parse(
        r##"{
            "operations": [
                { "op": "add", "path": "/components/0/props/variant/values/1", "value": "ghost" },
                { "op": "remove", "path": "/components/1" },
                { "op": "replace", "path": "/tokens/color/primary", "value": "#000" }
            ],
            "metadata": { "risk_level": "medium", "components_affected": ["Button", "Card"] }
        }"##,
    )
    .expect("must parse plan");

    let preview = SummaryDiffRenderer
        .render(&before, &after, &plan)
        .expect("must render");
    assert_eq!(preview.operation_count, 3);
    assert_eq!(preview.adds, 1);
    assert_eq!(preview.removes, 1);
    assert_eq!(preview.replaces, 1);
    assert_eq!(preview.risk_level, RiskLevel::Medium);
    assert!(preview
        .lines
        .iter()
        .any(|line| line == "remove /components/1"));
}

#[test]
fn plan_file_planner_requires_a_plan_path() {
    let planner = PlanFilePlanner::new(None);
    let err = planner
        .plan("anything", &sample_registry())
        .expect_err("must fail without plan file");
    assert!(err.to_string().contains("--plan"));
}

#[test]
fn plan_file_planner_reads_plan_from_disk() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create test root");
    let plan_path = root.join("plan.json");
    fs::write(
        &plan_path,
        r#"{
            "operations": [{ "op": "remove", "path": "/components/1" }],
            "metadata": { "riskLevel": "high", "componentsAffected": ["Card"] }
        }"#,
    )
    .expect("must write plan");

    let planner = PlanFilePlanner::new(Some(plan_path));
    let plan = planner
        .plan("remove Card", &sample_registry())
        .expect("must read plan");
    assert_eq!(plan.risk_level(), RiskLevel::High);
    assert_eq!(plan.operations.len(), 1);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn registry_path_resolution_prefers_cli_then_config_then_default() {
    let mut file_config = FileConfig::default();
    assert_eq!(
        resolve_registry_path(None, &file_config),
        PathBuf::from("./dist/registry.json")
    );

    file_config.registry_path = Some(PathBuf::from("design/registry.json"));
    assert_eq!(
        resolve_registry_path(None, &file_config),
        PathBuf::from("design/registry.json")
    );
    assert_eq!(
        resolve_registry_path(Some(PathBuf::from("cli.json")), &file_config),
        PathBuf::from("cli.json")
    );
}

#[test]
fn missing_config_file_yields_defaults() {
    let root = test_root();
    let config = load_file_config(Some(&root.join("tokensmith.toml"))).expect("must load");
    assert!(config.registry_path.is_none());
    assert!(config.git_enabled.is_none());
}

#[test]
fn config_file_risk_threshold_parses() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create test root");
    let path = root.join("tokensmith.toml");
    fs::write(&path, "max_auto_approve_risk = \"medium\"\nbackup_keep = 5\n")
        .expect("must write config");

    let config = load_file_config(Some(&path)).expect("must load");
    assert_eq!(
        config.max_auto_approve_risk().expect("must parse"),
        Some(RiskLevel::Medium)
    );
    assert_eq!(config.backup_keep, Some(5));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn no_git_flag_overrides_config_file_git_enabled() {
    let mut file_config = FileConfig::default();
    file_config.git_enabled = Some(true);

    let mut request = mutate_request();
    request.no_git = true;
    let config = build_orchestrator_config(&request, &file_config).expect("must build");
    assert!(!config.git_enabled);

    request.no_git = false;
    let config = build_orchestrator_config(&request, &file_config).expect("must build");
    assert!(config.git_enabled);
}

#[test]
fn transpile_targets_fall_back_to_config_file() {
    let mut file_config = FileConfig::default();
    file_config.transpile_targets = Some(vec!["react".to_string(), "vue".to_string()]);

    let request = mutate_request();
    let config = build_orchestrator_config(&request, &file_config).expect("must build");
    assert_eq!(config.transpile_targets, vec!["react", "vue"]);

    let mut request = mutate_request();
    request.transpile_targets = vec!["svelte".to_string()];
    let config = build_orchestrator_config(&request, &file_config).expect("must build");
    assert_eq!(config.transpile_targets, vec!["svelte"]);
}

#[test]
fn non_interactive_flag_disables_interactive_approval() {
    let file_config = FileConfig::default();
    let mut request = mutate_request();
    request.non_interactive = true;
    let config = build_orchestrator_config(&request, &file_config).expect("must build");
    assert!(!config.interactive);
}

#[test]
fn plain_status_lines_carry_bracketed_status() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "rollback complete"),
        "[ok] rollback complete"
    );
}

#[test]
fn empty_rollback_point_list_prints_placeholder() {
    let lines = format_rollback_point_lines(&[]);
    assert_eq!(lines, vec!["no rollback points available".to_string()]);
}

#[test]
fn completions_script_is_generated_for_bash() {
    let mut out = Vec::new();
    crate::completion::write_completions_script(clap_complete::Shell::Bash, &mut out)
        .expect("must generate");
    let script = String::from_utf8(out).expect("script must be utf-8");
    assert!(script.contains("tokensmith"));
}

#[test]
fn cli_parses_rollback_defaults() {
    use clap::Parser;
    let cli = crate::Cli::try_parse_from(["tokensmith", "rollback"]).expect("must parse");
    match cli.command {
        crate::Commands::Rollback { source, keep, .. } => {
            assert_eq!(source, "last");
            assert_eq!(keep, None);
        }
        _ => panic!("expected rollback command"),
    }
}
