//! The Action Executor.
//!
//! One branch per `ActionKind`. Every collaborator or filesystem failure inside a
//! branch is caught here and returned as `ActionOutcome::Failed`; nothing a
//! collaborator does can end the loop.

mod audit;
mod dialogue;
mod docs;
mod implement;

pub use audit::CodeTree;

use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::Crew;
use crate::decision::{Action, ActionKind};
use crate::state::ProjectState;
use crate::templates::Templates;
use crate::ui::{OrchestratorUI, render_halt, terminal_width};
use crate::workspace::Workspace;

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The branch ran to the end and wrote its artifacts.
    Completed {
        artifacts: Vec<PathBuf>,
        summary: String,
    },
    /// A collaborator or filesystem step failed; the workspace is unchanged
    /// apart from artifacts written before the failure.
    Failed { error: String },
    /// A terminal action: rendered for the operator, nothing written.
    Halted,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// What a successful branch produced.
#[derive(Debug)]
pub(crate) struct Completed {
    artifacts: Vec<PathBuf>,
    summary: String,
}

pub struct ActionExecutor {
    workspace: Workspace,
    templates: Templates,
    ui: Option<Arc<OrchestratorUI>>,
    render_halts: bool,
}

impl ActionExecutor {
    pub fn new(workspace: Workspace, templates: Templates) -> Self {
        Self {
            workspace,
            templates,
            ui: None,
            render_halts: true,
        }
    }

    pub fn with_ui(mut self, ui: Option<Arc<OrchestratorUI>>) -> Self {
        self.ui = ui;
        self
    }

    /// Print terminal actions to stdout (on by default).
    pub fn with_halt_rendering(mut self, enabled: bool) -> Self {
        self.render_halts = enabled;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub async fn execute(&self, action: &Action, state: &ProjectState, crew: &mut Crew) -> ActionOutcome {
        let action_type = action.action_type();
        let feedback = state.human_feedback();
        let result = match &action.kind {
            ActionKind::RunDialogue {
                requirements,
                resume_from,
            } => {
                dialogue::run(
                    &self.workspace,
                    crew,
                    requirements,
                    resume_from.as_deref(),
                    Local::now(),
                )
                .await
            }
            ActionKind::SynthesizeDocs {
                transcript,
                architecture_doc,
                constraints_doc,
            } => {
                docs::synthesize(
                    crew,
                    &self.templates,
                    transcript,
                    architecture_doc,
                    constraints_doc,
                    feedback,
                )
                .await
            }
            ActionKind::UpdateDocs {
                architecture_doc,
                constraints_doc,
                audit_log,
            } => {
                docs::revise(
                    crew,
                    architecture_doc,
                    constraints_doc,
                    audit_log.as_deref(),
                    feedback,
                )
                .await
            }
            ActionKind::ImplementCode {
                architecture_doc,
                constraints_doc,
                code_dir,
            } => {
                implement::run(
                    &self.workspace,
                    crew,
                    architecture_doc,
                    constraints_doc,
                    code_dir,
                    feedback,
                    self.ui.as_deref(),
                )
                .await
            }
            ActionKind::RunAudit {
                constraints_doc,
                code_dir,
            } => audit::run(&self.workspace, crew, constraints_doc, code_dir).await,
            ActionKind::AskHuman { .. } | ActionKind::Complete | ActionKind::Abort => {
                if self.render_halts {
                    println!(
                        "{}",
                        render_halt(action, self.workspace.project_name(), terminal_width())
                    );
                }
                return ActionOutcome::Halted;
            }
        };

        match result {
            Ok(done) => {
                tracing::info!(
                    project = %self.workspace.project_name(),
                    action = %action_type,
                    artifacts = done.artifacts.len(),
                    summary = %done.summary,
                    "action completed"
                );
                if let Some(ui) = &self.ui {
                    for path in &done.artifacts {
                        ui.show_artifact(path.strip_prefix(self.workspace.path()).unwrap_or(path));
                    }
                }
                ActionOutcome::Completed {
                    artifacts: done.artifacts,
                    summary: done.summary,
                }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(
                    project = %self.workspace.project_name(),
                    action = %action_type,
                    error = %error,
                    "action failed"
                );
                ActionOutcome::Failed { error }
            }
        }
    }
}
