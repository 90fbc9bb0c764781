use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use conductor::decision::HumanOption;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(
    version,
    about = "Drive a project from requirements to audited code through specialist agents"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every confirmation
    #[arg(long, global = true)]
    pub yes: bool,

    /// Directory holding one workspace per project
    #[arg(long, global = true, env = "CONDUCTOR_ROOT", default_value = "workspaces")]
    pub root: PathBuf,

    /// Path to conductor.toml (default: <root>/conductor.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project workspace and its requirements.md
    Init {
        project: String,
        /// Requirements file, or `-` to read stdin
        #[arg(short, long)]
        requirements: Option<PathBuf>,
        /// Replace an existing requirements.md without asking
        #[arg(long)]
        force: bool,
    },
    /// Show the assessed phase and the next action
    Status { project: String },
    /// List projects under the root with their phases
    List,
    /// Run the orchestration loop until it halts
    Run {
        project: String,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Per-call collaborator timeout in seconds
        #[arg(long)]
        call_timeout: Option<u64>,
        /// Delay between iterations in milliseconds
        #[arg(long)]
        pacing_ms: Option<u64>,
    },
    /// Resolve a failed audit: fix_implementation, revise_architecture or accept_violations
    Resolve {
        project: String,
        option: HumanOption,
        /// Operator note stored in feedback.md
        #[arg(short, long)]
        note: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Decide an implementer tool call read from stdin (Claude CLI hook)
    #[command(hide = true)]
    GateWrite {
        #[arg(long)]
        workspace: PathBuf,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default conductor.toml into the root
    Init,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // The hook speaks to the Claude CLI through its exit code and stderr only.
    if let Commands::GateWrite { workspace } = &cli.command {
        return Ok(ExitCode::from(cmd::cmd_gate_write(workspace)?));
    }

    let started_at = Local::now();
    let log_file = match &cli.command {
        Commands::Run { project, .. } => cmd::run::log_file(&cli.root, project, started_at),
        _ => None,
    };
    let _log_guard = conductor::logging::init(cli.verbose, log_file.as_deref())?;

    match &cli.command {
        Commands::Init {
            project,
            requirements,
            force,
        } => cmd::cmd_init(&cli, project, requirements.as_deref(), *force)?,
        Commands::Status { project } => cmd::cmd_status(&cli, project)?,
        Commands::List => cmd::cmd_list(&cli)?,
        Commands::Run {
            project,
            max_iterations,
            call_timeout,
            pacing_ms,
        } => {
            let overrides = conductor::config::RunOverrides {
                max_iterations: *max_iterations,
                call_timeout_secs: *call_timeout,
                pacing_ms: *pacing_ms,
            };
            let code = cmd::cmd_run(&cli, project, overrides, started_at).await?;
            return Ok(ExitCode::from(code));
        }
        Commands::Resolve {
            project,
            option,
            note,
        } => cmd::cmd_resolve(&cli, project, *option, note.as_deref()).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
        Commands::GateWrite { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
