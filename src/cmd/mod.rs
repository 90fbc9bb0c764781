//! CLI command implementations.
//!
//! | Module     | Commands handled           |
//! |------------|----------------------------|
//! | `project`  | `Init`, `Status`, `List`   |
//! | `run`      | `Run`                      |
//! | `resolve`  | `Resolve`                  |
//! | `config`   | `Config`                   |
//! | `gate`     | `GateWrite` (hook only)    |

pub mod config;
pub mod gate;
pub mod project;
pub mod resolve;
pub mod run;

pub use config::cmd_config;
pub use gate::cmd_gate_write;
pub use project::{cmd_init, cmd_list, cmd_status};
pub use resolve::cmd_resolve;
pub use run::cmd_run;

use anyhow::Result;

use super::Cli;
use conductor::agents::ClaudeSettings;
use conductor::config::Config;

fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.root.clone(), cli.config.as_deref(), cli.verbose, cli.yes)
}

/// Claude settings with this executable answering the write-scope hook.
fn claude_settings(config: &Config) -> ClaudeSettings {
    let mut settings = config.claude_settings();
    settings.write_gate = std::env::current_exe().ok();
    if settings.write_gate.is_none() {
        tracing::warn!("cannot locate own executable; implementer writes are checked after the run only");
    }
    settings
}
