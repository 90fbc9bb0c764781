//! The `conductor.toml` file model.
//!
//! Every field has a serde default, so a partial file (or none at all) is valid.
//!
//! ```toml
//! [orchestrator]
//! max_iterations = 10
//! pacing_ms = 500
//! call_timeout_secs = 300
//! max_consecutive_failures = 0
//!
//! [claude]
//! cmd = "claude"
//! session_continuity = true
//! extra_args = []
//!
//! [templates]
//! dir = "templates"
//!
//! [agents.implementer]
//! max_turns = 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::agents::Role;
use crate::orchestrator::{DEFAULT_MAX_ITERATIONS, DEFAULT_PACING_MS};

pub const CONFIG_FILE_NAME: &str = "conductor.toml";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// 0 leaves dialogue and other retries bounded only by the iteration cap.
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            pacing_ms: default_pacing_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            max_consecutive_failures: 0,
        }
    }
}

/// Claude CLI integration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaudeSection {
    /// Claude CLI command; falls back to `CLAUDE_CMD`, then `claude`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    /// Reuse one CLI session per role via `--resume` (default: true)
    #[serde(default = "default_session_continuity")]
    pub session_continuity: bool,
    /// Appended verbatim to every CLI invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_session_continuity() -> bool {
    true
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            cmd: None,
            session_continuity: default_session_continuity(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatesSection {
    /// Directory whose template files replace the built-in ones; relative paths
    /// resolve against the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentSection {
    fn is_empty(&self) -> bool {
        self.max_turns.is_none() && self.system_prompt.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentsSection {
    #[serde(default)]
    pub architect: AgentSection,
    #[serde(default)]
    pub coder: AgentSection,
    #[serde(default)]
    pub docs: AgentSection,
    #[serde(default)]
    pub implementer: AgentSection,
    #[serde(default)]
    pub auditor: AgentSection,
}

impl AgentsSection {
    pub fn for_role(&self, role: Role) -> &AgentSection {
        match role {
            Role::Architect => &self.architect,
            Role::Coder => &self.coder,
            Role::Docs => &self.docs,
            Role::Implementer => &self.implementer,
            Role::Auditor => &self.auditor,
        }
    }

    /// Roles with at least one override.
    pub fn overridden(&self) -> impl Iterator<Item = (Role, &AgentSection)> {
        Role::ALL
            .into_iter()
            .map(|role| (role, self.for_role(role)))
            .filter(|(_, section)| !section.is_empty())
    }
}

/// The complete conductor.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub claude: ClaudeSection,
    #[serde(default)]
    pub templates: TemplatesSection,
    #[serde(default)]
    pub agents: AgentsSection,
}

impl ConductorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conductor.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conductor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Get the Claude command (file → env → default).
    pub fn claude_cmd(&self) -> String {
        self.claude
            .cmd
            .clone()
            .or_else(|| std::env::var("CLAUDE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.orchestrator.max_iterations == 0 {
            warnings.push("max_iterations is 0: runs will end before the first action".to_string());
        }
        if self.orchestrator.call_timeout_secs == 0 {
            warnings.push("call_timeout_secs is 0: every collaborator call will time out".to_string());
        }
        for (role, section) in self.agents.overridden() {
            if section.max_turns == Some(0) {
                warnings.push(format!("agents.{}.max_turns is 0", role));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ConductorToml::parse("").unwrap();
        assert_eq!(config, ConductorToml::default());
        assert_eq!(config.orchestrator.max_iterations, 10);
        assert_eq!(config.orchestrator.pacing_ms, 500);
        assert_eq!(config.orchestrator.call_timeout_secs, 300);
        assert_eq!(config.orchestrator.max_consecutive_failures, 0);
        assert!(config.claude.session_continuity);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ConductorToml::parse(
            r#"
            [orchestrator]
            max_iterations = 25

            [claude]
            cmd = "/opt/claude"
            extra_args = ["--model", "opus"]

            [agents.implementer]
            max_turns = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_iterations, 25);
        assert_eq!(config.orchestrator.pacing_ms, 500);
        assert_eq!(config.claude_cmd(), "/opt/claude");
        assert_eq!(config.claude.extra_args, vec!["--model", "opus"]);
        assert_eq!(config.agents.for_role(Role::Implementer).max_turns, Some(40));
        assert_eq!(config.agents.for_role(Role::Architect).max_turns, None);
        let overridden: Vec<Role> = config.agents.overridden().map(|(r, _)| r).collect();
        assert_eq!(overridden, vec![Role::Implementer]);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(ConductorToml::parse("[orchestrator\nmax_iterations = 1").is_err());
        assert!(ConductorToml::parse("[orchestrator]\nmax_iterations = \"ten\"").is_err());
    }

    #[test]
    fn test_validate_flags_zero_limits() {
        let mut config = ConductorToml::default();
        config.orchestrator.max_iterations = 0;
        config.agents.coder.max_turns = Some(0);
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("agents.coder.max_turns"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = ConductorToml::default();
        config.orchestrator.pacing_ms = 0;
        config.templates.dir = Some(PathBuf::from("my-templates"));
        config.save(&path).unwrap();
        assert_eq!(ConductorToml::load(&path).unwrap(), config);
    }
}
