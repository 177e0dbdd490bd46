use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokensmith_core::{MutationPlan, PatchOpKind, RegistryDocument};
use tokensmith_session::{
    ApprovalProvider, DeployHook, DiffRenderer, Planner, PreviewSummary, PromptAnswer, Transpiler,
    ValidationReport, Validator,
};

pub(crate) struct PlanFilePlanner {
    plan_path: Option<PathBuf>,
}

impl PlanFilePlanner {
    pub fn new(plan_path: Option<PathBuf>) -> Self {
        Self { plan_path }
    }
}

impl Planner for PlanFilePlanner {
    fn plan(&self, _prompt: &str, _registry: &RegistryDocument) -> Result<MutationPlan> {
        let Some(path) = &self.plan_path else {
            return Err(anyhow!(
                "no mutation planner configured; pass --plan <file> with a mutation plan \
                 (natural-language planning requires an external planner)"
            ));
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading plan file: {}", path.display()))?;
        MutationPlan::parse(&raw)
            .with_context(|| format!("failed parsing plan file: {}", path.display()))
    }
}

pub(crate) struct SummaryDiffRenderer;

impl DiffRenderer for SummaryDiffRenderer {
    fn render(
        &self,
        before: &RegistryDocument,
        after: &RegistryDocument,
        plan: &MutationPlan,
    ) -> Result<PreviewSummary> {
        let count = |kind: PatchOpKind| {
            plan.operations
                .iter()
                .filter(|operation| operation.op == kind)
                .count()
        };

        let mut lines = Vec::new();
        lines.push(format!(
            "components: {} -> {}",
            before.component_count(),
            after.component_count()
        ));
        lines.push(format!(
            "tokens: {} -> {}",
            before.token_count(),
            after.token_count()
        ));
        for operation in &plan.operations {
            lines.push(format!("{} {}", operation.op.as_str(), operation.path));
        }

        Ok(PreviewSummary {
            risk_level: plan.risk_level(),
            components_affected: plan.metadata.components_affected.clone(),
            operation_count: plan.operations.len(),
            adds: count(PatchOpKind::Add),
            removes: count(PatchOpKind::Remove),
            replaces: count(PatchOpKind::Replace),
            lines,
            failures: Vec::new(),
        })
    }
}

pub(crate) struct StructuralValidator;

impl Validator for StructuralValidator {
    fn validate(&self, document: &RegistryDocument) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        let value = document.value();

        match value.get("components") {
            Some(Value::Array(components)) => {
                let mut seen = HashSet::new();
                for (index, component) in components.iter().enumerate() {
                    match component.get("name").and_then(Value::as_str) {
                        Some(name) => {
                            if !seen.insert(name.to_string()) {
                                errors.push(format!("duplicate component name: {name}"));
                            }
                        }
                        None => errors.push(format!("component {index} has no string name")),
                    }
                }
            }
            Some(_) => errors.push("components must be an array".to_string()),
            None => errors.push("registry has no components key".to_string()),
        }

        match value.get("tokens") {
            Some(Value::Object(categories)) => {
                for (category, tokens) in categories {
                    if !tokens.is_object() {
                        errors.push(format!("token category '{category}' must be an object"));
                    }
                }
            }
            Some(_) => errors.push("tokens must be an object".to_string()),
            None => errors.push("registry has no tokens key".to_string()),
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }
}

pub(crate) struct CommandTranspiler {
    command: String,
}

impl CommandTranspiler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Transpiler for CommandTranspiler {
    fn transpile(&self, target: &str, registry: &RegistryDocument) -> Result<String> {
        let (program, args) = split_command(&self.command)?;
        let mut child = Command::new(program)
            .args(args)
            .arg(target)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed launching transpile command: {}", self.command))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(registry.to_pretty_string()?.as_bytes())
                .with_context(|| format!("failed writing registry to transpile command: {}", self.command))?;
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("failed waiting for transpile command: {}", self.command))?;
        if !output.status.success() {
            anyhow::bail!(
                "transpile command failed for target '{target}': {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

pub(crate) struct CommandHook {
    name: String,
    command: String,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

impl DeployHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _registry: &RegistryDocument) -> Result<String> {
        let (program, args) = split_command(&self.command)?;
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed launching {} command: {}", self.name, self.command))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} command failed: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if stdout.is_empty() {
            "ok".to_string()
        } else {
            stdout
        })
    }
}

pub(crate) fn split_command(command: &str) -> Result<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("hook command must not be empty"))?;
    Ok((program, parts.collect()))
}

pub(crate) struct StdinApprovalProvider;

impl ApprovalProvider for StdinApprovalProvider {
    fn ask(&mut self, preview: &PreviewSummary) -> Result<PromptAnswer> {
        println!(
            "{} mutation(s), risk {}: [a]pply, [c]ancel, [s]ave preview",
            preview.operation_count, preview.risk_level
        );
        loop {
            let line = read_prompt_line()?;
            match parse_prompt_answer(&line) {
                Some(ParsedAnswer::Apply) => return Ok(PromptAnswer::Apply),
                Some(ParsedAnswer::Cancel) => return Ok(PromptAnswer::Cancel),
                Some(ParsedAnswer::SavePreview) => {
                    println!("preview path [tokensmith-preview.json]:");
                    let path_line = read_prompt_line()?;
                    let path = if path_line.trim().is_empty() {
                        PathBuf::from("tokensmith-preview.json")
                    } else {
                        PathBuf::from(path_line.trim())
                    };
                    return Ok(PromptAnswer::SavePreview(path));
                }
                None => println!("unrecognized answer; expected a, c, or s"),
            }
        }
    }

    fn confirm_high_risk(&mut self, _preview: &PreviewSummary) -> Result<bool> {
        println!("this mutation is HIGH risk; type 'yes' to confirm:");
        let line = read_prompt_line()?;
        Ok(line.trim().eq_ignore_ascii_case("yes"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParsedAnswer {
    Apply,
    Cancel,
    SavePreview,
}

pub(crate) fn parse_prompt_answer(line: &str) -> Option<ParsedAnswer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "a" | "apply" => Some(ParsedAnswer::Apply),
        "c" | "cancel" | "q" | "quit" => Some(ParsedAnswer::Cancel),
        "s" | "save" => Some(ParsedAnswer::SavePreview),
        _ => None,
    }
}

fn read_prompt_line() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading approval answer from stdin")?;
    Ok(line)
}
