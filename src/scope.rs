//! Path-scoped write permission for the implementation collaborator.
//!
//! Read tools are always allowed. Write tools are allowed only for paths strictly
//! beneath `<workspace>/code/`. Every other tool is denied. Denials are values
//! reported back to the collaborator, never errors.
//!
//! The Claude CLI consults the scope before every tool call through a
//! `PreToolUse` command hook that runs `conductor gate-write`. The hook receives
//! the call as JSON on stdin; exit code 2 blocks the call and hands stderr back
//! to the model.

use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};

/// Tools that never modify the filesystem.
pub const READ_TOOLS: &[&str] = &["Read", "Glob", "Grep", "LS"];

/// Tools that create or edit a single file named in their input.
pub const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Input keys that carry the target path of a write tool.
const PATH_KEYS: &[&str] = &["file_path", "notebook_path", "path"];

/// Hidden subcommand the hook invokes.
pub const GATE_SUBCOMMAND: &str = "gate-write";

/// Exit code that makes the CLI block a tool call.
pub const HOOK_BLOCK_EXIT: u8 = 2;

/// The part of a `PreToolUse` hook payload the gate needs.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { message: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }

    fn deny(message: impl Into<String>) -> Self {
        PermissionDecision::Deny {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteScope {
    workspace: Vec<String>,
    code_dir: Vec<String>,
    display: String,
}

impl WriteScope {
    pub fn new(workspace: &Path) -> Self {
        let absolute = std::path::absolute(workspace).unwrap_or_else(|_| workspace.to_path_buf());
        let workspace = normalized_components(&absolute.to_string_lossy());
        let mut code_dir = workspace.clone();
        code_dir.push(crate::workspace::CODE_DIR.to_string());
        let display = format!("/{}/", code_dir.join("/"));
        Self {
            workspace,
            code_dir,
            display,
        }
    }

    /// Decide a tool call from its name and JSON input.
    pub fn check_tool(&self, tool: &str, input: &Value) -> PermissionDecision {
        if READ_TOOLS.contains(&tool) {
            return PermissionDecision::Allow;
        }
        if WRITE_TOOLS.contains(&tool) {
            let target = PATH_KEYS
                .iter()
                .find_map(|k| input.get(*k).and_then(Value::as_str));
            return match target {
                Some(path) => self.check_write(path),
                None => PermissionDecision::deny(format!("{} call has no target path", tool)),
            };
        }
        PermissionDecision::deny(format!("Tool {} not allowed", tool))
    }

    /// Decide a raw hook payload. Payloads that do not parse are denied.
    pub fn check_hook(&self, payload: &str) -> PermissionDecision {
        match serde_json::from_str::<HookInput>(payload) {
            Ok(input) => self.check_tool(&input.tool_name, &input.tool_input),
            Err(e) => PermissionDecision::deny(format!("Unreadable tool call: {}", e)),
        }
    }

    /// Claude CLI `--settings` JSON that routes every tool call through
    /// `<exe> gate-write --workspace <workspace>`.
    pub fn hook_settings(&self, exe: &Path) -> String {
        let command = format!(
            "{} {} --workspace {}",
            shell_quote(&exe.to_string_lossy()),
            GATE_SUBCOMMAND,
            shell_quote(&self.workspace_dir().to_string_lossy()),
        );
        json!({
            "hooks": {
                "PreToolUse": [{
                    "matcher": "*",
                    "hooks": [{ "type": "command", "command": command }]
                }]
            }
        })
        .to_string()
    }

    /// Decide a write to `path`, which may be absolute or workspace-relative and may
    /// use either separator.
    pub fn check_write(&self, path: &str) -> PermissionDecision {
        if self.contains(path) {
            PermissionDecision::Allow
        } else {
            PermissionDecision::deny(format!("Can only write beneath {}", self.display))
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        let unified = path.replace('\\', "/");
        if unified.trim().is_empty() || unified.split('/').any(|seg| seg == "..") {
            return false;
        }
        let mut target = if unified.starts_with('/') {
            Vec::new()
        } else {
            self.workspace.clone()
        };
        target.extend(normalized_components(&unified));
        target.len() > self.code_dir.len() && target.starts_with(&self.code_dir)
    }

    /// The code directory as a path.
    pub fn code_dir(&self) -> PathBuf {
        let mut path = PathBuf::from("/");
        path.extend(&self.code_dir);
        path
    }

    pub fn workspace_dir(&self) -> PathBuf {
        let mut path = PathBuf::from("/");
        path.extend(&self.workspace);
        path
    }
}

/// Quote for a POSIX shell.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// Split on `/`, dropping empty and `.` segments.
fn normalized_components(path: &str) -> Vec<String> {
    Path::new(&path.replace('\\', "/"))
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
