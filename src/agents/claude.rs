//! Claude CLI backend.
//!
//! Each `send` spawns `claude --print --output-format stream-json --verbose`,
//! writes the prompt on stdin and folds the streamed events into an `AgentReply`.
//! With session continuity on, later calls for the same role pass `--resume` so the
//! CLI keeps the conversation.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::{Agent, AgentProvider, AgentReply, Role, SessionSpec, ToolUse};
use crate::errors::CollaboratorError;
use crate::stream::{ContentBlock, StreamEvent, describe_tool_use, tool_emoji, truncate_thinking};
use crate::ui::OrchestratorUI;

#[derive(Debug, Clone)]
pub struct ClaudeSettings {
    pub cmd: String,
    pub session_continuity: bool,
    pub extra_args: Vec<String>,
    /// Executable that answers the write-scope hook for code-writing sessions.
    pub write_gate: Option<PathBuf>,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            cmd: "claude".to_string(),
            session_continuity: true,
            extra_args: Vec::new(),
            write_gate: None,
        }
    }
}

pub struct ClaudeProvider {
    settings: ClaudeSettings,
    ui: Option<Arc<OrchestratorUI>>,
}

impl ClaudeProvider {
    pub fn new(settings: ClaudeSettings, ui: Option<Arc<OrchestratorUI>>) -> Self {
        Self { settings, ui }
    }
}

impl AgentProvider for ClaudeProvider {
    fn create(&self, spec: SessionSpec) -> Box<dyn Agent> {
        Box::new(ClaudeSession::new(spec, self.settings.clone(), self.ui.clone()))
    }
}

pub struct ClaudeSession {
    spec: SessionSpec,
    settings: ClaudeSettings,
    ui: Option<Arc<OrchestratorUI>>,
    connected: bool,
    session_id: Option<String>,
}

/// Aborts a background task when dropped, including when the owning call times out.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ClaudeSession {
    pub fn new(spec: SessionSpec, settings: ClaudeSettings, ui: Option<Arc<OrchestratorUI>>) -> Self {
        Self {
            spec,
            settings,
            ui,
            connected: false,
            session_id: None,
        }
    }

    /// Arguments for the next call.
    pub fn command_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["--print", "--output-format", "stream-json", "--verbose"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push("--append-system-prompt".to_string());
        args.push(self.spec.system_prompt.clone());
        args.push("--max-turns".to_string());
        args.push(self.spec.max_turns.to_string());
        args.extend(self.spec.tools.cli_args());
        if let (Some(scope), Some(gate)) = (self.spec.tools.write_scope(), &self.settings.write_gate) {
            args.push("--settings".to_string());
            args.push(scope.hook_settings(gate));
        }
        if self.settings.session_continuity
            && let Some(id) = &self.session_id
        {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    fn log_step(&self, msg: &str) {
        if let Some(ref ui) = self.ui {
            ui.log_step(msg);
        }
    }
}

#[async_trait]
impl Agent for ClaudeSession {
    fn role(&self) -> Role {
        self.spec.role
    }

    async fn acquire(&mut self) -> Result<(), CollaboratorError> {
        self.connected = true;
        tracing::debug!(role = %self.spec.role, cmd = %self.settings.cmd, "claude session acquired");
        Ok(())
    }

    async fn send(&mut self, prompt: &str) -> Result<AgentReply, CollaboratorError> {
        let role = self.spec.role;
        if !self.connected {
            return Err(CollaboratorError::NotConnected { role });
        }
        let io_err = |source: std::io::Error| CollaboratorError::Io { role, source };

        let args = self.command_args();
        let mut cmd = Command::new(&self.settings.cmd);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.spec.cwd.is_dir() {
            cmd.current_dir(&self.spec.cwd);
        }

        self.log_step(&format!("{}: spawning {}", role.title(), self.settings.cmd));
        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|source| CollaboratorError::Spawn { role, source })?;
        tracing::debug!(%role, pid = child.id().unwrap_or(0), "claude process spawned");

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.map_err(io_err)?;
            stdin.shutdown().await.map_err(io_err)?;
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let ui_clone = self.ui.clone();
        let _elapsed = AbortOnDrop(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Some(ref ui) = ui_clone {
                    ui.update_elapsed(start.elapsed());
                }
            }
        }));

        let stdout = child.stdout.take().ok_or_else(|| {
            io_err(std::io::Error::other("claude stdout was not captured"))
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let mut accumulated_text = String::new();
        let mut final_result: Option<String> = None;
        let mut is_error = false;
        let mut tool_uses = Vec::new();
        let mut session_id: Option<String> = None;

        while let Some(line) = lines.next_line().await.map_err(io_err)? {
            if line.is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<StreamEvent>(&line) {
                Ok(event) => event,
                Err(_) => {
                    // Not an event; keep it as plain output.
                    accumulated_text.push_str(&line);
                    accumulated_text.push('\n');
                    continue;
                }
            };
            if let Some(id) = event.session_id() {
                session_id = Some(id.to_string());
            }
            match event {
                StreamEvent::Assistant { message, .. } => {
                    for block in message.content {
                        match block {
                            ContentBlock::ToolUse { name, input, .. } => {
                                if let Some(ref ui) = self.ui {
                                    ui.show_tool_use(tool_emoji(&name), &describe_tool_use(&name, &input));
                                }
                                tool_uses.push(ToolUse::new(name, input));
                            }
                            ContentBlock::Text { text } => {
                                accumulated_text.push_str(&text);
                                accumulated_text.push('\n');
                                let snippet = truncate_thinking(&text, 60);
                                if !snippet.is_empty()
                                    && let Some(ref ui) = self.ui
                                {
                                    ui.show_thinking(&snippet);
                                }
                            }
                            ContentBlock::Other => {}
                        }
                    }
                }
                StreamEvent::Result {
                    result,
                    is_error: err,
                    ..
                } => {
                    final_result = result;
                    is_error = err;
                }
                StreamEvent::User { .. } | StreamEvent::System { .. } | StreamEvent::Unknown => {}
            }
        }

        let status = child.wait().await.map_err(io_err)?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let exit_code = status.code().unwrap_or(-1);
        self.log_step(&format!(
            "{}: completed in {:.1}s (exit: {})",
            role.title(),
            start.elapsed().as_secs_f64(),
            exit_code
        ));

        let text = final_result.unwrap_or(accumulated_text);
        if is_error {
            return Err(CollaboratorError::Reported {
                role,
                message: if text.trim().is_empty() { stderr } else { text },
            });
        }
        if !status.success() {
            return Err(CollaboratorError::NonZeroExit {
                role,
                code: exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        if self.settings.session_continuity && session_id.is_some() {
            self.session_id = session_id.clone();
        }
        Ok(AgentReply {
            text,
            tool_uses,
            session_id,
        })
    }

    fn release(&mut self) {
        if self.connected {
            tracing::debug!(role = %self.spec.role, "claude session released");
        }
        self.connected = false;
        self.session_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ToolPolicy;
    use crate::scope::WriteScope;
    use std::path::Path;

    fn spec(role: Role) -> SessionSpec {
        let scope = WriteScope::new(Path::new("/ws/demo"));
        SessionSpec {
            role,
            system_prompt: "persona".into(),
            cwd: PathBuf::from("/ws/demo"),
            tools: ToolPolicy::for_role(role, &scope),
            max_turns: 7,
        }
    }

    #[test]
    fn test_command_args_for_text_role() {
        let session = ClaudeSession::new(spec(Role::Architect), ClaudeSettings::default(), None);
        let args = session.command_args();
        assert_eq!(&args[..4], &["--print", "--output-format", "stream-json", "--verbose"]);
        let joined = args.join(" ");
        assert!(joined.contains("--append-system-prompt persona"));
        assert!(joined.contains("--max-turns 7"));
        assert!(joined.contains("--disallowedTools"));
        assert!(!joined.contains("--resume"));
    }

    #[test]
    fn test_resume_only_with_continuity_and_known_session() {
        let mut session = ClaudeSession::new(spec(Role::Coder), ClaudeSettings::default(), None);
        session.session_id = Some("abc".into());
        assert!(session.command_args().join(" ").contains("--resume abc"));

        let settings = ClaudeSettings {
            session_continuity: false,
            ..Default::default()
        };
        let mut session = ClaudeSession::new(spec(Role::Coder), settings, None);
        session.session_id = Some("abc".into());
        assert!(!session.command_args().contains(&"--resume".to_string()));
    }

    #[test]
    fn test_extra_args_come_last() {
        let settings = ClaudeSettings {
            extra_args: vec!["--model".into(), "sonnet".into()],
            ..Default::default()
        };
        let session = ClaudeSession::new(spec(Role::Implementer), settings, None);
        let args = session.command_args();
        assert_eq!(&args[args.len() - 2..], &["--model", "sonnet"]);
        assert!(args.join(" ").contains("Write(code/**)"));
    }

    #[test]
    fn test_write_gate_hook_only_for_implementer() {
        let settings = ClaudeSettings {
            write_gate: Some(PathBuf::from("/opt/conductor")),
            ..Default::default()
        };
        let session = ClaudeSession::new(spec(Role::Implementer), settings.clone(), None);
        let args = session.command_args();
        let at = args.iter().position(|a| a == "--settings").unwrap();
        assert!(args[at + 1].contains("'/opt/conductor' gate-write --workspace '/ws/demo'"));

        for role in [Role::Architect, Role::Auditor] {
            let session = ClaudeSession::new(spec(role), settings.clone(), None);
            assert!(!session.command_args().contains(&"--settings".to_string()));
        }
        let session = ClaudeSession::new(spec(Role::Implementer), ClaudeSettings::default(), None);
        assert!(!session.command_args().contains(&"--settings".to_string()));
    }

    #[tokio::test]
    async fn test_send_before_acquire_is_not_connected() {
        let mut session = ClaudeSession::new(spec(Role::Docs), ClaudeSettings::default(), None);
        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::NotConnected { role: Role::Docs }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let settings = ClaudeSettings {
            cmd: "/nonexistent/claude-binary".into(),
            ..Default::default()
        };
        let mut session = ClaudeSession::new(spec(Role::Auditor), settings, None);
        session.acquire().await.unwrap();
        let err = session.send("audit").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Spawn { role: Role::Auditor, .. }));
        session.release();
        assert!(session.session_id.is_none());
    }
}
