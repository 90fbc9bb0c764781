//! Workspace commands: `conductor init`, `conductor status` and `conductor list`.

use anyhow::{Context, Result, bail};
use std::io::{IsTerminal, Read};
use std::path::Path;

use super::super::Cli;
use super::load_config;

fn read_requirements(source: Option<&Path>) -> Result<String> {
    use dialoguer::Input;

    let text = match source {
        Some(path) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read requirements from stdin")?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements file {}", path.display()))?,
        None => {
            if !std::io::stdin().is_terminal() {
                bail!("No requirements given. Pass --requirements <file> or --requirements - to read stdin.");
            }
            Input::<String>::new()
                .with_prompt("What should be built?")
                .interact_text()
                .context("Failed to read requirements")?
        }
    };
    if text.trim().is_empty() {
        bail!("Requirements are empty");
    }
    Ok(text)
}

pub fn cmd_init(cli: &Cli, project: &str, requirements: Option<&Path>, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(cli)?;
    let workspace = config.workspace(project)?;
    let text = read_requirements(requirements)?;

    let existing = workspace.requirements().exists();
    let overwrite = if !existing {
        false
    } else if force || cli.yes {
        true
    } else {
        Confirm::new()
            .with_prompt(format!("{} already has requirements.md. Replace it?", project))
            .default(false)
            .interact()
            .unwrap_or(false)
    };

    let result = workspace.init(&text, overwrite)?;
    if result.created {
        println!("Created workspace {}", workspace.path().display());
    }
    if existing && !result.overwritten {
        println!("Kept existing {}", result.requirements.display());
        return Ok(());
    }
    println!(
        "{} {}",
        if result.overwritten { "Replaced" } else { "Wrote" },
        result.requirements.display()
    );
    println!();
    println!("Next: `conductor run {}`", project);
    Ok(())
}

pub fn cmd_status(cli: &Cli, project: &str) -> Result<()> {
    use conductor::decision::decide;
    use conductor::state::assess;
    use conductor::ui::{render_state, terminal_width};
    use conductor::workspace::ArtifactReader;

    let config = load_config(cli)?;
    let workspace = config.workspace(project)?;
    if !workspace.exists() {
        println!(
            "No workspace for '{}' under {}. Create it with `conductor init {}`.",
            project,
            config.root.display(),
            project
        );
        println!();
    }
    let state = assess(&ArtifactReader::new(workspace));
    let action = decide(&state);
    print!("{}", render_state(&state, &action, terminal_width()));
    Ok(())
}

pub fn cmd_list(cli: &Cli) -> Result<()> {
    use conductor::state::assess;
    use conductor::workspace::{ArtifactReader, list_projects};

    let config = load_config(cli)?;
    let projects = list_projects(&config.root)?;
    if projects.is_empty() {
        println!(
            "No projects under {}. Create one with `conductor init <project>`.",
            config.root.display()
        );
        return Ok(());
    }

    println!("{:<28} Phase", "Project");
    println!("{:<28} -----", "-------");
    for name in projects {
        let workspace = config.workspace(&name)?;
        let state = assess(&ArtifactReader::new(workspace));
        println!("{:<28} {}", name, console::style(state.phase()).cyan());
    }
    Ok(())
}
