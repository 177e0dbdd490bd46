use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokensmith_core::{MutationPlan, RiskLevel};
use tokensmith_store::ApprovalMethod;

use crate::PreviewSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAnswer {
    Apply,
    Cancel,
    SavePreview(PathBuf),
}

pub trait ApprovalProvider {
    fn ask(&mut self, preview: &PreviewSummary) -> Result<PromptAnswer>;
    fn confirm_high_risk(&mut self, preview: &PreviewSummary) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct ApprovalOptions {
    pub auto_approve: bool,
    pub interactive: bool,
    pub max_auto_approve_risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub method: ApprovalMethod,
    pub reason: String,
}

pub struct ApprovalGate;

impl ApprovalGate {
    pub fn decide(
        plan: &MutationPlan,
        preview: &PreviewSummary,
        options: &ApprovalOptions,
        provider: &mut dyn ApprovalProvider,
    ) -> Result<ApprovalDecision> {
        if options.auto_approve || !options.interactive {
            return Ok(Self::decide_automatic(plan.risk_level(), options));
        }

        loop {
            match provider.ask(preview)? {
                PromptAnswer::Apply => {
                    if plan.risk_level() == RiskLevel::High
                        && !provider.confirm_high_risk(preview)?
                    {
                        return Ok(ApprovalDecision {
                            approved: false,
                            method: ApprovalMethod::Interactive,
                            reason: "high-risk apply declined at secondary confirmation"
                                .to_string(),
                        });
                    }
                    return Ok(ApprovalDecision {
                        approved: true,
                        method: ApprovalMethod::Interactive,
                        reason: "approved interactively".to_string(),
                    });
                }
                PromptAnswer::Cancel => {
                    return Ok(ApprovalDecision {
                        approved: false,
                        method: ApprovalMethod::Interactive,
                        reason: "cancelled by operator".to_string(),
                    });
                }
                PromptAnswer::SavePreview(path) => {
                    let rendered = serde_json::to_string_pretty(preview)
                        .context("failed serializing preview")?;
                    fs::write(&path, rendered)
                        .with_context(|| format!("failed writing preview: {}", path.display()))?;
                }
            }
        }
    }

    fn decide_automatic(risk: RiskLevel, options: &ApprovalOptions) -> ApprovalDecision {
        if risk <= options.max_auto_approve_risk {
            ApprovalDecision {
                approved: true,
                method: ApprovalMethod::Automatic,
                reason: format!(
                    "risk level {risk} within auto-approve threshold {}",
                    options.max_auto_approve_risk
                ),
            }
        } else {
            ApprovalDecision {
                approved: false,
                method: ApprovalMethod::Automatic,
                reason: format!(
                    "risk level {risk} too high for auto-approval (threshold {})",
                    options.max_auto_approve_risk
                ),
            }
        }
    }
}
