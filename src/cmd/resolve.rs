//! Operator resolution of a failed audit: `conductor resolve`.

use anyhow::{Result, bail};
use std::sync::Arc;

use super::super::Cli;
use super::{claude_settings, load_config};
use conductor::decision::HumanOption;

pub async fn cmd_resolve(
    cli: &Cli,
    project: &str,
    option: HumanOption,
    note: Option<&str>,
) -> Result<()> {
    use conductor::agents::{ClaudeProvider, Crew};
    use conductor::config::RunOverrides;
    use conductor::executor::ActionExecutor;
    use conductor::resolve::resolve;
    use conductor::ui::icons::{CHECK, HUMAN};
    use conductor::workspace::WorkspaceLock;
    use console::style;

    let config = load_config(cli)?;
    let workspace = config.workspace(project)?;
    if !workspace.exists() {
        bail!(
            "Project '{}' not found under {}",
            project,
            config.root.display()
        );
    }
    let _lock = WorkspaceLock::acquire(&workspace)?;

    let executor =
        ActionExecutor::new(workspace.clone(), config.templates()).with_halt_rendering(false);
    let provider = ClaudeProvider::new(claude_settings(&config), None);
    let mut crew = Crew::new(
        Arc::new(provider),
        workspace.path(),
        config.crew_settings(&RunOverrides::default()),
    );

    if option == HumanOption::ReviseArchitecture {
        println!("{}Revising architecture documents for {}...", HUMAN, project);
    }
    let result = resolve(&workspace, option, note, &executor, &mut crew).await;
    crew.release_all();
    let resolution = result?;

    println!("{}Resolved {} with {}", CHECK, project, style(resolution.option).bold());
    println!("  Feedback: {}", resolution.feedback.display());
    if let Some(dir) = &resolution.archived {
        println!("  Archived previous attempt to {}", dir.display());
    }
    for path in &resolution.written {
        println!("  Wrote {}", path.display());
    }
    println!("  Next phase: {}", style(resolution.next_phase).cyan());
    println!();
    println!("Continue with `conductor run {}`", project);
    Ok(())
}
