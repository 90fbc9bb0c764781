//! Per-run collaborator sessions.
//!
//! `Crew` holds at most one session per role, created and acquired on first use.
//! Each call is bounded by the per-call timeout. Sessions are released by
//! `release_all` and again when the crew is dropped, so a panic or a cancelled
//! run still closes them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{Agent, AgentProvider, AgentReply, Role, SessionSpec, ToolPolicy, prompts};
use crate::errors::CollaboratorError;
use crate::scope::WriteScope;

/// Overrides for one role.
#[derive(Debug, Clone, Default)]
pub struct RoleSettings {
    pub max_turns: Option<u32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrewSettings {
    pub call_timeout: Duration,
    pub roles: BTreeMap<Role, RoleSettings>,
}

impl Default for CrewSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(300),
            roles: BTreeMap::new(),
        }
    }
}

pub struct Crew {
    provider: Arc<dyn AgentProvider>,
    workspace: PathBuf,
    scope: WriteScope,
    settings: CrewSettings,
    sessions: BTreeMap<Role, Box<dyn Agent>>,
}

impl Crew {
    pub fn new(provider: Arc<dyn AgentProvider>, workspace: &Path, settings: CrewSettings) -> Self {
        Self {
            provider,
            workspace: workspace.to_path_buf(),
            scope: WriteScope::new(workspace),
            settings,
            sessions: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> &WriteScope {
        &self.scope
    }

    /// Session parameters for a role, with overrides applied.
    pub fn spec_for(&self, role: Role) -> SessionSpec {
        let overrides = self.settings.roles.get(&role);
        SessionSpec {
            role,
            system_prompt: overrides
                .and_then(|o| o.system_prompt.clone())
                .unwrap_or_else(|| prompts::persona(role).to_string()),
            cwd: self.workspace.clone(),
            tools: ToolPolicy::for_role(role, &self.scope),
            max_turns: overrides
                .and_then(|o| o.max_turns)
                .unwrap_or_else(|| role.default_max_turns()),
        }
    }

    /// Roles with an open session.
    pub fn active_roles(&self) -> Vec<Role> {
        self.sessions.keys().copied().collect()
    }

    /// Architect turn.
    pub async fn propose(&mut self, prompt: &str) -> Result<String, CollaboratorError> {
        self.call(Role::Architect, prompt).await.map(|r| r.text)
    }

    /// Coder turn.
    pub async fn evaluate(&mut self, prompt: &str) -> Result<String, CollaboratorError> {
        self.call(Role::Coder, prompt).await.map(|r| r.text)
    }

    /// One document from the docs collaborator.
    pub async fn synthesize(&mut self, prompt: &str) -> Result<String, CollaboratorError> {
        self.call(Role::Docs, prompt).await.map(|r| r.text)
    }

    /// Implementation run; the reply keeps tool uses so writes can be checked.
    pub async fn implement(&mut self, prompt: &str) -> Result<AgentReply, CollaboratorError> {
        self.call(Role::Implementer, prompt).await
    }

    pub async fn audit(&mut self, prompt: &str) -> Result<String, CollaboratorError> {
        self.call(Role::Auditor, prompt).await.map(|r| r.text)
    }

    async fn call(&mut self, role: Role, prompt: &str) -> Result<AgentReply, CollaboratorError> {
        let limit = self.settings.call_timeout;
        let timed_out = || CollaboratorError::Timeout {
            role,
            secs: limit.as_secs(),
        };

        if !self.sessions.contains_key(&role) {
            let mut agent = self.provider.create(self.spec_for(role));
            tracing::debug!(%role, "acquiring collaborator session");
            tokio::time::timeout(limit, agent.acquire())
                .await
                .map_err(|_| timed_out())??;
            self.sessions.insert(role, agent);
        }
        let agent = self
            .sessions
            .get_mut(&role)
            .ok_or(CollaboratorError::NotConnected { role })?;

        tracing::debug!(%role, prompt_chars = prompt.len(), "sending prompt");
        let reply = tokio::time::timeout(limit, agent.send(prompt))
            .await
            .map_err(|_| timed_out())??;

        if reply.text.trim().is_empty() && reply.tool_uses.is_empty() {
            return Err(CollaboratorError::EmptyResponse { role });
        }
        tracing::debug!(
            %role,
            response_chars = reply.text.len(),
            tool_uses = reply.tool_uses.len(),
            "collaborator replied"
        );
        Ok(reply)
    }

    /// Release every open session. Idempotent.
    pub fn release_all(&mut self) {
        while let Some((role, mut agent)) = self.sessions.pop_first() {
            agent.release();
            tracing::debug!(%role, "released collaborator session");
        }
    }
}

impl Drop for Crew {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{Scripted, ScriptedProvider};
    use async_trait::async_trait;

    fn crew_with(provider: &ScriptedProvider) -> Crew {
        Crew::new(
            Arc::new(provider.clone()),
            Path::new("/ws/demo"),
            CrewSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_sessions_are_created_lazily_once_per_role() {
        let provider = ScriptedProvider::happy();
        let mut crew = crew_with(&provider);
        assert!(crew.active_roles().is_empty());

        crew.propose("one").await.unwrap();
        crew.propose("two").await.unwrap();
        crew.evaluate("three").await.unwrap();

        assert_eq!(crew.active_roles(), vec![Role::Architect, Role::Coder]);
        assert_eq!(provider.journal().created, vec![Role::Architect, Role::Coder]);
        assert_eq!(provider.journal().prompts.len(), 3);
    }

    #[tokio::test]
    async fn test_release_all_releases_every_session() {
        let provider = ScriptedProvider::happy();
        let mut crew = crew_with(&provider);
        crew.propose("p").await.unwrap();
        crew.audit("a").await.unwrap();

        crew.release_all();
        crew.release_all();

        assert!(crew.active_roles().is_empty());
        assert_eq!(provider.journal().released, vec![Role::Architect, Role::Auditor]);
    }

    #[tokio::test]
    async fn test_dropping_crew_releases_sessions() {
        let provider = ScriptedProvider::happy();
        {
            let mut crew = crew_with(&provider);
            crew.propose("p").await.unwrap();
            crew.evaluate("e").await.unwrap();
        }
        assert_eq!(provider.journal().released, vec![Role::Architect, Role::Coder]);
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_empty_response_error() {
        let provider = ScriptedProvider::happy();
        provider.push(Role::Docs, Scripted::Reply(AgentReply::text("  \n")));
        let mut crew = crew_with(&provider);
        let err = crew.synthesize("doc").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::EmptyResponse { role: Role::Docs }));
    }

    #[tokio::test]
    async fn test_role_overrides_apply_to_session_spec() {
        let mut settings = CrewSettings::default();
        settings.roles.insert(
            Role::Coder,
            RoleSettings {
                max_turns: Some(2),
                system_prompt: Some("Be terse.".into()),
            },
        );
        let crew = Crew::new(Arc::new(ScriptedProvider::happy()), Path::new("/ws/demo"), settings);
        let spec = crew.spec_for(Role::Coder);
        assert_eq!(spec.max_turns, 2);
        assert_eq!(spec.system_prompt, "Be terse.");
        assert_eq!(crew.spec_for(Role::Implementer).max_turns, 20);
        assert!(crew.spec_for(Role::Implementer).tools.write_scope().is_some());
    }

    struct Stalled;

    #[async_trait]
    impl Agent for Stalled {
        fn role(&self) -> Role {
            Role::Architect
        }
        async fn acquire(&mut self) -> Result<(), CollaboratorError> {
            Ok(())
        }
        async fn send(&mut self, _prompt: &str) -> Result<AgentReply, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AgentReply::text("late"))
        }
        fn release(&mut self) {}
    }

    struct StalledProvider;

    impl AgentProvider for StalledProvider {
        fn create(&self, _spec: SessionSpec) -> Box<dyn Agent> {
            Box::new(Stalled)
        }
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let settings = CrewSettings {
            call_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut crew = Crew::new(Arc::new(StalledProvider), Path::new("/ws/demo"), settings);
        let err = crew.propose("hello").await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Timeout {
                role: Role::Architect,
                ..
            }
        ));
    }
}
