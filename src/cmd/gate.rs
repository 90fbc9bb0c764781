//! Write-scope hook answered for the Claude CLI: `conductor gate-write`.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use conductor::scope::{HOOK_BLOCK_EXIT, PermissionDecision, WriteScope};

/// Decide the tool call on stdin. Returns the exit code the hook protocol expects.
pub fn cmd_gate_write(workspace: &Path) -> Result<u8> {
    let mut payload = String::new();
    std::io::stdin()
        .read_to_string(&mut payload)
        .context("Failed to read tool call from stdin")?;

    match WriteScope::new(workspace).check_hook(&payload) {
        PermissionDecision::Allow => Ok(0),
        PermissionDecision::Deny { message } => {
            eprintln!("{}", message);
            Ok(HOOK_BLOCK_EXIT)
        }
    }
}
