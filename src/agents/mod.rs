//! Collaborator sessions.
//!
//! Every collaborator role is reached through an `Agent`, a session with an
//! explicit lifecycle: `acquire` before the first `send`, `release` when the run
//! ends. `AgentProvider` creates sessions; the Claude CLI backend is one provider,
//! test doubles are another.

pub mod claude;
pub mod crew;
pub mod prompts;

pub use claude::{ClaudeProvider, ClaudeSettings};
pub use crew::{Crew, CrewSettings, RoleSettings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

use crate::errors::CollaboratorError;
use crate::scope::{READ_TOOLS, WRITE_TOOLS, WriteScope};

/// A collaborator persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Architect,
    Coder,
    Docs,
    Implementer,
    Auditor,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Architect,
        Role::Coder,
        Role::Docs,
        Role::Implementer,
        Role::Auditor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Coder => "coder",
            Role::Docs => "docs",
            Role::Implementer => "implementer",
            Role::Auditor => "auditor",
        }
    }

    /// Heading used in transcripts and progress output.
    pub fn title(&self) -> &'static str {
        match self {
            Role::Architect => "Architect",
            Role::Coder => "Coder",
            Role::Docs => "Docs",
            Role::Implementer => "Implementation Coder",
            Role::Auditor => "Auditor",
        }
    }

    /// Default `--max-turns` per call.
    pub fn default_max_turns(&self) -> u32 {
        match self {
            Role::Architect | Role::Coder => 5,
            Role::Docs => 3,
            Role::Implementer => 20,
            Role::Auditor => 10,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a session may do with tools.
#[derive(Debug, Clone)]
pub enum ToolPolicy {
    /// Text only: every mutating tool is disallowed.
    NoWrites,
    /// Read-type tools only.
    ReadOnly,
    /// Read tools plus writes beneath the scope's code directory.
    CodeWrites(WriteScope),
}

impl ToolPolicy {
    pub fn for_role(role: Role, scope: &WriteScope) -> Self {
        match role {
            Role::Architect | Role::Coder | Role::Docs => ToolPolicy::NoWrites,
            Role::Auditor => ToolPolicy::ReadOnly,
            Role::Implementer => ToolPolicy::CodeWrites(scope.clone()),
        }
    }

    /// Claude CLI flags that enforce this policy.
    pub fn cli_args(&self) -> Vec<String> {
        match self {
            ToolPolicy::NoWrites => {
                let mut denied: Vec<&str> = WRITE_TOOLS.to_vec();
                denied.push("Bash");
                vec!["--disallowedTools".to_string(), denied.join(",")]
            }
            ToolPolicy::ReadOnly => vec![
                "--allowedTools".to_string(),
                READ_TOOLS
                    .iter()
                    .filter(|t| **t != "LS")
                    .copied()
                    .collect::<Vec<_>>()
                    .join(","),
            ],
            ToolPolicy::CodeWrites(_) => {
                let mut allowed: Vec<String> = READ_TOOLS.iter().map(|t| t.to_string()).collect();
                allowed.extend(
                    ["Write", "Edit", "MultiEdit"]
                        .iter()
                        .map(|t| format!("{}({}/**)", t, crate::workspace::CODE_DIR)),
                );
                vec!["--allowedTools".to_string(), allowed.join(",")]
            }
        }
    }

    pub fn write_scope(&self) -> Option<&WriteScope> {
        match self {
            ToolPolicy::CodeWrites(scope) => Some(scope),
            _ => None,
        }
    }
}

/// Everything needed to open a session for one role.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub role: Role,
    pub system_prompt: String,
    pub cwd: PathBuf,
    pub tools: ToolPolicy,
    pub max_turns: u32,
}

/// A tool invocation observed in a collaborator's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub name: String,
    pub input: Value,
}

impl ToolUse {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// One response from a collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub session_id: Option<String>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Agent: Send {
    fn role(&self) -> Role;

    /// Open the session. Must succeed before `send`.
    async fn acquire(&mut self) -> Result<(), CollaboratorError>;

    async fn send(&mut self, prompt: &str) -> Result<AgentReply, CollaboratorError>;

    /// Close the session. Safe to call more than once, and must not block: it also
    /// runs while a crew is dropped.
    fn release(&mut self);
}

pub trait AgentProvider: Send + Sync {
    fn create(&self, spec: SessionSpec) -> Box<dyn Agent>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_role_display_is_lowercase() {
        assert_eq!(Role::Implementer.to_string(), "implementer");
        assert_eq!(Role::Architect.title(), "Architect");
    }

    #[test]
    fn test_text_roles_cannot_write() {
        let args = ToolPolicy::NoWrites.cli_args();
        assert_eq!(args[0], "--disallowedTools");
        for tool in ["Write", "Edit", "MultiEdit", "NotebookEdit", "Bash"] {
            assert!(args[1].split(',').any(|t| t == tool), "{tool} must be disallowed");
        }
    }

    #[test]
    fn test_auditor_is_read_only() {
        let scope = WriteScope::new(Path::new("/ws/demo"));
        let args = ToolPolicy::for_role(Role::Auditor, &scope).cli_args();
        assert_eq!(args, vec!["--allowedTools", "Read,Glob,Grep"]);
    }

    #[test]
    fn test_implementer_writes_are_scoped_to_code() {
        let scope = WriteScope::new(Path::new("/ws/demo"));
        let policy = ToolPolicy::for_role(Role::Implementer, &scope);
        let args = policy.cli_args();
        assert_eq!(args[0], "--allowedTools");
        assert!(args[1].contains("Write(code/**)"));
        assert!(args[1].contains("Edit(code/**)"));
        assert!(!args[1].contains("Bash"));
        assert!(policy.write_scope().is_some());
    }
}
