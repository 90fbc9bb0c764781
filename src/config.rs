use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::{ClaudeSettings, CrewSettings, RoleSettings};
use crate::conductor_config::{CONFIG_FILE_NAME, ConductorToml};
use crate::orchestrator::LoopSettings;
use crate::templates::Templates;
use crate::workspace::Workspace;

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub max_iterations: Option<u32>,
    pub call_timeout_secs: Option<u64>,
    pub pacing_ms: Option<u64>,
}

/// Runtime configuration for conductor.
///
/// Bridges the parsed `conductor.toml` with the command line: resolves the
/// workspace root and derives the settings each engine component takes.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    /// The file the settings were read from, if any.
    pub config_file: Option<PathBuf>,
    pub toml: ConductorToml,
    pub verbose: bool,
    pub yes: bool,
}

impl Config {
    /// Load settings for a workspace root.
    ///
    /// Lookup order: the explicit `--config` path, `<root>/conductor.toml`,
    /// `<config_dir>/conductor/conductor.toml`, then built-in defaults. An explicit
    /// path that does not exist is an error.
    pub fn load(root: PathBuf, explicit: Option<&Path>, verbose: bool, yes: bool) -> Result<Self> {
        let config_file = Self::find_config_file(&root, explicit)?;
        let toml = match &config_file {
            Some(path) => ConductorToml::load(path)?,
            None => ConductorToml::default(),
        };
        for warning in toml.validate() {
            tracing::warn!(%warning, "configuration");
        }
        tracing::debug!(
            root = %root.display(),
            config = config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            "configuration loaded"
        );
        Ok(Self {
            root,
            config_file,
            toml,
            verbose,
            yes,
        })
    }

    fn find_config_file(root: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }
        let in_root = root.join(CONFIG_FILE_NAME);
        if in_root.is_file() {
            return Ok(Some(in_root));
        }
        Ok(dirs::config_dir()
            .map(|dir| dir.join("conductor").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file()))
    }

    pub fn workspace(&self, project: &str) -> Result<Workspace> {
        Workspace::new(&self.root, project).context("Invalid project")
    }

    pub fn loop_settings(&self, overrides: &RunOverrides) -> LoopSettings {
        let section = &self.toml.orchestrator;
        LoopSettings {
            max_iterations: overrides.max_iterations.unwrap_or(section.max_iterations),
            pacing_ms: overrides.pacing_ms.unwrap_or(section.pacing_ms),
            max_consecutive_failures: section.max_consecutive_failures,
        }
    }

    pub fn crew_settings(&self, overrides: &RunOverrides) -> CrewSettings {
        let secs = overrides
            .call_timeout_secs
            .unwrap_or(self.toml.orchestrator.call_timeout_secs);
        let roles: BTreeMap<_, _> = self
            .toml
            .agents
            .overridden()
            .map(|(role, section)| {
                (
                    role,
                    RoleSettings {
                        max_turns: section.max_turns,
                        system_prompt: section.system_prompt.clone(),
                    },
                )
            })
            .collect();
        CrewSettings {
            call_timeout: Duration::from_secs(secs),
            roles,
        }
    }

    pub fn claude_settings(&self) -> ClaudeSettings {
        ClaudeSettings {
            cmd: self.toml.claude_cmd(),
            session_continuity: self.toml.claude.session_continuity,
            extra_args: self.toml.claude.extra_args.clone(),
            write_gate: None,
        }
    }

    pub fn templates(&self) -> Templates {
        match &self.toml.templates.dir {
            Some(dir) if dir.is_absolute() => Templates::with_override_dir(dir),
            Some(dir) => Templates::with_override_dir(self.root.join(dir)),
            None => Templates::embedded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Role;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_any_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join("ws"), None, false, false).unwrap();
        let settings = config.loop_settings(&RunOverrides::default());
        assert_eq!(settings, LoopSettings::default());
        assert_eq!(
            config.crew_settings(&RunOverrides::default()).call_timeout,
            Duration::from_secs(300)
        );
        assert!(config.templates().override_dir().is_none());
    }

    #[test]
    fn test_root_file_is_found_and_cli_overrides_win() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[orchestrator]\nmax_iterations = 4\npacing_ms = 50\nmax_consecutive_failures = 3\n\
             [templates]\ndir = \"tpl\"\n[agents.auditor]\nmax_turns = 2\n",
        )
        .unwrap();
        let config = Config::load(dir.path().to_path_buf(), None, true, false).unwrap();
        assert_eq!(config.config_file, Some(dir.path().join(CONFIG_FILE_NAME)));

        let overrides = RunOverrides {
            max_iterations: Some(9),
            call_timeout_secs: Some(30),
            pacing_ms: None,
        };
        let settings = config.loop_settings(&overrides);
        assert_eq!(settings.max_iterations, 9);
        assert_eq!(settings.pacing_ms, 50);
        assert_eq!(settings.max_consecutive_failures, 3);

        let crew = config.crew_settings(&overrides);
        assert_eq!(crew.call_timeout, Duration::from_secs(30));
        assert_eq!(crew.roles.get(&Role::Auditor).and_then(|r| r.max_turns), Some(2));
        assert!(!crew.roles.contains_key(&Role::Coder));
        assert_eq!(config.templates().override_dir(), Some(dir.path().join("tpl").as_path()));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(dir.path().to_path_buf(), Some(&missing), false, false).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_explicit_config_beats_root_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[orchestrator]\nmax_iterations = 4\n").unwrap();
        let explicit = dir.path().join("other.toml");
        fs::write(&explicit, "[claude]\ncmd = \"fake-claude\"\n").unwrap();
        let config = Config::load(dir.path().to_path_buf(), Some(&explicit), false, true).unwrap();
        assert_eq!(config.loop_settings(&RunOverrides::default()).max_iterations, 10);
        assert_eq!(config.claude_settings().cmd, "fake-claude");
    }
}
