//! The orchestration loop: `conductor run`.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::super::Cli;
use super::{claude_settings, load_config};
use conductor::config::RunOverrides;

/// Exit code after Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT: u8 = 130;

/// The JSON log file for a run, placed next to the run record.
///
/// `None` when the project has no workspace yet; such a run halts without
/// writing anything.
pub fn log_file(root: &Path, project: &str, at: DateTime<Local>) -> Option<PathBuf> {
    use conductor::workspace::Workspace;

    Workspace::new(root, project)
        .ok()
        .filter(|ws| ws.exists())
        .map(|ws| ws.logs_dir().join(format!("{}.log", ws.orchestration_stem(at))))
}

/// Run the loop and return the process exit code for its outcome.
pub async fn cmd_run(
    cli: &Cli,
    project: &str,
    overrides: RunOverrides,
    started_at: DateTime<Local>,
) -> Result<u8> {
    use conductor::agents::{ClaudeProvider, Crew};
    use conductor::orchestrator::Orchestrator;
    use conductor::ui::{OrchestratorUI, render_report, terminal_width};
    use conductor::workspace::WorkspaceLock;

    let config = load_config(cli)?;
    let workspace = config.workspace(project)?;
    let _lock = if workspace.exists() {
        Some(WorkspaceLock::acquire(&workspace)?)
    } else {
        None
    };

    let settings = config.loop_settings(&overrides);
    let ui = Arc::new(OrchestratorUI::new(
        u64::from(settings.max_iterations),
        cli.verbose,
    ));
    let provider = ClaudeProvider::new(claude_settings(&config), Some(ui.clone()));
    let crew = Crew::new(
        Arc::new(provider),
        workspace.path(),
        config.crew_settings(&overrides),
    );

    let run = Orchestrator::new(workspace, crew, config.templates(), settings)
        .with_ui(Some(ui.clone()))
        .with_started_at(started_at)
        .run();
    // Dropping the run on interrupt releases the collaborator sessions.
    let report = tokio::select! {
        report = run => report,
        _ = tokio::signal::ctrl_c() => {
            ui.finish("interrupted");
            tracing::warn!(project, "run interrupted");
            eprintln!("\nInterrupted; collaborator sessions released.");
            return Ok(INTERRUPTED_EXIT);
        }
    };

    println!();
    print!("{}", render_report(&report, terminal_width()));
    Ok(u8::try_from(report.outcome.exit_code()).unwrap_or(1))
}
