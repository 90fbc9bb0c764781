//! Configuration view and validation commands: `conductor config`.

use anyhow::{Context, Result};

use super::super::{Cli, ConfigCommands};
use super::load_config;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    use conductor::conductor_config::{CONFIG_FILE_NAME, ConductorToml};

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = load_config(cli)?;
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();
            match &config.config_file {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No {} found; using defaults.", CONFIG_FILE_NAME),
            }
            println!("Workspace root: {}", config.root.display());
            println!();

            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", config.toml.claude_cmd());
            println!();
            if config.config_file.is_none() {
                println!("Run 'conductor config init' to create a {}.", CONFIG_FILE_NAME);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = load_config(cli)?;
            if config.config_file.is_none() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let warnings = config.toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = match &cli.config {
                Some(path) => path.clone(),
                None => cli.root.join(CONFIG_FILE_NAME),
            };
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(dir) = config_path.parent()
                && !dir.as_os_str().is_empty()
            {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            ConductorToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [orchestrator] max_iterations, pacing_ms, call_timeout_secs");
            println!("  - [claude] cmd, session_continuity, extra_args");
            println!("  - [templates] dir");
            println!("  - [agents.<role>] max_turns, system_prompt");
            println!();
        }
    }

    Ok(())
}
