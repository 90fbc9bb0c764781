pub mod icons;
pub mod progress;

pub use progress::OrchestratorUI;

use console::style;
use std::fmt::Write as _;
use terminal_size::{Width, terminal_size};

use crate::decision::{Action, ActionKind};
use crate::executor::ActionOutcome;
use crate::orchestrator::{RunOutcome, RunReport};
use crate::state::ProjectState;
use icons::{CHECK, CROSS, HUMAN, SPARKLE, STOP, WARN};

const MIN_WIDTH: usize = 40;
const MAX_WIDTH: usize = 100;

/// Width used for wrapped console text.
pub fn terminal_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| usize::from(w))
        .unwrap_or(80)
        .clamp(MIN_WIDTH, MAX_WIDTH)
}

fn wrap_indented(text: &str, width: usize, indent: &str) -> String {
    let options = textwrap::Options::new(width)
        .initial_indent(indent)
        .subsequent_indent(indent);
    textwrap::fill(text, options)
}

/// Plain-text rendering of a halting action for the operator.
pub fn render_halt(action: &Action, project: &str, width: usize) -> String {
    let mut out = String::new();
    match &action.kind {
        ActionKind::AskHuman { options } => {
            let _ = writeln!(
                out,
                "\n{}{} needs operator input",
                HUMAN,
                style(project).yellow().bold()
            );
            let _ = writeln!(out, "{}", wrap_indented(&action.reason, width, "  "));
            if !options.is_empty() {
                out.push('\n');
                for (i, option) in options.iter().enumerate() {
                    let line = format!("{}. {} - {}", i + 1, option, option.description());
                    let _ = writeln!(out, "{}", wrap_indented(&line, width, "  "));
                }
                let _ = writeln!(
                    out,
                    "\n  Resolve with: {}",
                    style(format!("conductor resolve {} <option> [--note <text>]", project)).cyan()
                );
            }
        }
        ActionKind::Complete => {
            let _ = writeln!(out, "\n{}{} is complete", SPARKLE, style(project).green().bold());
            let _ = writeln!(out, "{}", wrap_indented(&action.reason, width, "  "));
        }
        ActionKind::Abort => {
            let _ = writeln!(out, "\n{}{} aborted", STOP, style(project).red().bold());
            let _ = writeln!(out, "{}", wrap_indented(&action.reason, width, "  "));
        }
        _ => {
            let _ = writeln!(out, "{}", wrap_indented(&action.to_string(), width, "  "));
        }
    }
    out
}

/// Run summary listing every history entry and the final outcome.
pub fn render_report(report: &RunReport, width: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{} {}",
        style("Run summary:").bold(),
        style(&report.project).yellow().bold()
    );
    for entry in &report.history {
        let status = match &entry.outcome {
            ActionOutcome::Completed { summary, .. } => format!("{}{}", CHECK, summary),
            ActionOutcome::Failed { error } => format!("{}failed: {}", CROSS, error),
            ActionOutcome::Halted => "halted".to_string(),
        };
        let line = format!(
            "{:>2}. [{}] {} ({:.1}s) {}",
            entry.iteration,
            entry.phase,
            entry.action,
            entry.duration_ms as f64 / 1000.0,
            status
        );
        let options = textwrap::Options::new(width).subsequent_indent("      ");
        let _ = writeln!(out, "{}", textwrap::fill(&line, options));
    }

    let (label, reason) = match &report.outcome {
        RunOutcome::Complete { reason } => (style("COMPLETE").green().bold(), reason.clone()),
        RunOutcome::AskHuman { reason, .. } => (style("ASK_HUMAN").yellow().bold(), reason.clone()),
        RunOutcome::Abort { reason } => (style("ABORT").red().bold(), reason.clone()),
        RunOutcome::IterationBudgetExhausted { max_iterations } => (
            style("INCOMPLETE").red().bold(),
            format!(
                "Iteration budget of {} exhausted before a halting action. Run again to continue.",
                max_iterations
            ),
        ),
    };
    let _ = writeln!(out, "\n{} {}", style("Outcome:").bold(), label);
    let _ = writeln!(out, "{}", wrap_indented(&reason, width, "  "));
    let _ = writeln!(out, "{} {}", style("Final phase:").bold(), report.final_phase);
    if let Some(path) = &report.run_record {
        let _ = writeln!(out, "{} {}", style("Run record:").dim(), path.display());
    }
    out
}

/// Assessed state plus the action the policy would pick next.
pub fn render_state(state: &ProjectState, next: &Action, width: usize) -> String {
    let facts = state.facts();
    let mark = |present: bool| if present { "x" } else { " " };
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", style("Project:").bold(), style(state.project_name()).yellow().bold());
    let _ = writeln!(out, "{} {}", style("Workspace:").bold(), state.workspace_path().display());
    let _ = writeln!(out, "{} {}", style("Phase:").bold(), style(state.phase()).cyan());
    if state.is_anomalous() {
        let _ = writeln!(out, "{}state could not be classified", WARN);
    }
    out.push('\n');
    let rows = [
        ("requirements.md", facts.has_requirements),
        ("conversation", facts.has_conversation),
        ("dialogue consensus", facts.dialogue_consensus),
        ("ARCHITECTURE.md", facts.has_architecture_doc),
        ("CONSTRAINTS.md", facts.has_constraints_doc),
        ("code", facts.has_code),
        ("implementation log", facts.has_implementation_log),
        ("audit log", facts.has_audit_log),
    ];
    for (name, present) in rows {
        let _ = writeln!(out, "  [{}] {}", mark(present), name);
    }
    let verdict = match facts.audit_passed {
        Some(true) => "passed",
        Some(false) => "failed",
        None => "unknown",
    };
    let _ = writeln!(out, "  audit verdict: {}", verdict);
    if let Some(feedback) = state.human_feedback() {
        let _ = writeln!(out, "\n{}", style("Operator feedback:").bold());
        let _ = writeln!(out, "{}", wrap_indented(feedback, width, "  "));
    }
    let _ = writeln!(out, "\n{} {}", style("Next action:").bold(), style(next.action_type()).cyan());
    let _ = writeln!(out, "{}", wrap_indented(&next.reason, width, "  "));
    for (i, option) in next.options().iter().enumerate() {
        let _ = writeln!(out, "  {}. {} - {}", i + 1, option, option.description());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{HumanOption, REASON_AUDIT_FAILED, decide};
    use crate::orchestrator::HistoryEntry;
    use crate::state::Phase;
    use crate::workspace::ArtifactFacts;
    use std::path::Path;

    #[test]
    fn test_ask_human_lists_numbered_options() {
        let action = Action::ask_human(REASON_AUDIT_FAILED, HumanOption::AUDIT_FAILED.to_vec());
        let text = render_halt(&action, "shop", 80);
        assert!(text.contains("1. fix_implementation"));
        assert!(text.contains("2. revise_architecture"));
        assert!(text.contains("3. accept_violations"));
        assert!(text.contains("conductor resolve shop <option>"));
        assert!(text.contains("constraint violations"));
    }

    #[test]
    fn test_every_halt_renders_its_reason() {
        for action in [
            Action::new(ActionKind::Complete, "all done here"),
            Action::abort("gave up after retries"),
            Action::ask_human("need requirements first", Vec::new()),
        ] {
            let text = render_halt(&action, "shop", 60);
            assert!(text.contains(&action.reason), "{text}");
        }
        let no_options = render_halt(&Action::ask_human("need requirements first", Vec::new()), "shop", 60);
        assert!(!no_options.contains("1."));
    }

    #[test]
    fn test_long_reasons_wrap_to_width() {
        let action = Action::abort("word ".repeat(40));
        let text = render_halt(&action, "p", 40);
        assert!(text.lines().all(|l| console::measure_text_width(l) <= 40));
    }

    #[test]
    fn test_report_lists_history_and_outcome() {
        let report = RunReport {
            project: "shop".into(),
            outcome: RunOutcome::IterationBudgetExhausted { max_iterations: 1 },
            history: vec![HistoryEntry {
                iteration: 1,
                phase: Phase::ArchitecturalDialogue,
                action: crate::decision::ActionType::RunDialogue,
                reason: "start".into(),
                inputs: Default::default(),
                outcome: ActionOutcome::Failed {
                    error: "architect call timed out".into(),
                },
                started_at: chrono::Local::now(),
                duration_ms: 1500,
            }],
            final_phase: Phase::ArchitecturalDialogue,
            run_record: None,
        };
        let text = render_report(&report, 120);
        assert!(text.contains("[architectural_dialogue] run_dialogue (1.5s)"));
        assert!(text.contains("failed: architect call timed out"));
        assert!(text.contains("INCOMPLETE"));
        assert!(text.contains("Iteration budget of 1 exhausted"));
    }

    #[test]
    fn test_state_shows_facts_and_next_action() {
        let facts = ArtifactFacts {
            has_requirements: true,
            ..Default::default()
        };
        let state = ProjectState::from_facts("shop", Path::new("/ws/shop"), facts);
        let text = render_state(&state, &decide(&state), 80);
        assert!(text.contains("[x] requirements.md"));
        assert!(text.contains("[ ] conversation"));
        assert!(text.contains("architectural_dialogue"));
        assert!(text.contains("run_dialogue"));
    }
}
