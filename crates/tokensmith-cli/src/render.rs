use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use tokensmith_session::{PreviewSummary, RollbackOutcome, RollbackPoint, SessionOutcome};
use tokensmith_store::PruneOutcome;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn print_status(style: OutputStyle, status: &str, message: &str) {
    println!("{}", render_status_line(style, status, message));
}

pub(crate) fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("[{status}] {message}"),
        OutputStyle::Rich => format!("{} {message}", colorize(status_style(status), status)),
    }
}

pub(crate) fn start_step_spinner(style: OutputStyle, label: &str) -> Option<ProgressBar> {
    if style != OutputStyle::Rich {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

pub(crate) fn finish_spinner(spinner: Option<ProgressBar>) {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}

pub(crate) fn format_preview_lines(preview: &PreviewSummary) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "preview: {} operations ({} add, {} remove, {} replace), risk {}",
        preview.operation_count,
        preview.adds,
        preview.removes,
        preview.replaces,
        preview.risk_level
    ));
    if !preview.components_affected.is_empty() {
        lines.push(format!(
            "affected components: {}",
            preview.components_affected.join(", ")
        ));
    }
    lines.extend(preview.lines.iter().cloned());
    for failure in &preview.failures {
        lines.push(format!("unresolvable: {failure}"));
    }
    lines
}

pub(crate) fn format_session_outcome_lines(outcome: &SessionOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "session {}: {} ({} steps completed, {} failed, {}ms)",
        outcome.session_id,
        if outcome.success { "ok" } else { "failed" },
        outcome.completed_steps,
        outcome.failed_steps,
        outcome.duration_ms
    ));
    if outcome.mutations_applied {
        lines.push(format!(
            "applied {} mutation(s)",
            outcome.record.mutations.applied
        ));
        if let Some(backup_path) = &outcome.backup_path {
            lines.push(format!("backup: {}", backup_path.display()));
        }
        if let Some(undo_path) = &outcome.undo_path {
            lines.push(format!("undo patch: {}", undo_path.display()));
        }
    } else if let Some(approval) = &outcome.approval {
        if !approval.approved {
            lines.push(format!("not applied: {}", approval.reason));
        }
    }
    for result in &outcome.deploy_results {
        let line = match (&result.detail, &result.error) {
            (Some(detail), _) if result.success => format!("deploy {}: {detail}", result.name),
            (_, Some(error)) => format!("deploy {} failed: {error}", result.name),
            _ => format!("deploy {}: done", result.name),
        };
        lines.push(line);
    }
    lines
}

pub(crate) fn format_rollback_outcome_lines(outcome: &RollbackOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("rolled back from {}", outcome.source_description));
    match outcome.operations_applied {
        Some(count) => lines.push(format!("applied {count} undo operation(s)")),
        None => lines.push("restored full snapshot".to_string()),
    }
    if let Some(backup_path) = &outcome.pre_rollback_backup {
        lines.push(format!("pre-rollback backup: {}", backup_path.display()));
    }
    lines.push(format!("wrote {}", outcome.output_path.display()));
    lines
}

pub(crate) fn format_rollback_point_lines(points: &[RollbackPoint]) -> Vec<String> {
    if points.is_empty() {
        return vec!["no rollback points available".to_string()];
    }
    points
        .iter()
        .map(|point| {
            format!(
                "{:>12}  {}  {}",
                point.timestamp_unix, point.reference, point.description
            )
        })
        .collect()
}

pub(crate) fn format_cleanup_lines(outcome: &PruneOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "removed {} backup(s), retained {}",
        outcome.removed, outcome.retained
    )];
    for failure in &outcome.failures {
        lines.push(format!("failed to remove: {failure}"));
    }
    lines
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "fail" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
