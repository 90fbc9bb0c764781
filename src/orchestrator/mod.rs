//! The orchestration loop.
//!
//! Each iteration: assess, decide, execute, append to history, check for a halt,
//! pace. The loop owns the collaborator sessions and releases them on every exit.

pub mod report;

pub use report::{RunLog, RunRecord};

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agents::Crew;
use crate::decision::{Action, ActionKind, ActionType, HumanOption, decide};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::state::{Phase, assess};
use crate::templates::Templates;
use crate::ui::OrchestratorUI;
use crate::workspace::{ArtifactReader, Workspace};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_PACING_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopSettings {
    pub max_iterations: u32,
    /// Delay between iterations.
    pub pacing_ms: u64,
    /// Abort after this many failed actions in a row; 0 never aborts.
    pub max_consecutive_failures: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            pacing_ms: DEFAULT_PACING_MS,
            max_consecutive_failures: 0,
        }
    }
}

impl LoopSettings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Complete {
        reason: String,
    },
    AskHuman {
        reason: String,
        options: Vec<HumanOption>,
    },
    Abort {
        reason: String,
    },
    /// The iteration cap ran out before any halting action. Not a success.
    IterationBudgetExhausted {
        max_iterations: u32,
    },
}

impl RunOutcome {
    fn from_terminal(action: &Action) -> Option<Self> {
        let reason = action.reason.clone();
        match &action.kind {
            ActionKind::Complete => Some(RunOutcome::Complete { reason }),
            ActionKind::AskHuman { options } => Some(RunOutcome::AskHuman {
                reason,
                options: options.clone(),
            }),
            ActionKind::Abort => Some(RunOutcome::Abort { reason }),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Complete { .. })
    }

    /// Process exit status for `conductor run`.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Complete { .. } => 0,
            RunOutcome::AskHuman { .. } => 2,
            RunOutcome::Abort { .. } => 3,
            RunOutcome::IterationBudgetExhausted { .. } => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Complete { .. } => "complete",
            RunOutcome::AskHuman { .. } => "ask_human",
            RunOutcome::Abort { .. } => "abort",
            RunOutcome::IterationBudgetExhausted { .. } => "max_iterations_exceeded",
        }
    }
}

/// One executed action. The history is append-only and never read by `decide`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub phase: Phase,
    pub action: ActionType,
    pub reason: String,
    pub inputs: BTreeMap<String, String>,
    pub outcome: ActionOutcome,
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub project: String,
    pub outcome: RunOutcome,
    pub history: Vec<HistoryEntry>,
    pub final_phase: Phase,
    /// Where the JSON run record was written, if it was.
    pub run_record: Option<PathBuf>,
}

pub struct Orchestrator {
    workspace: Workspace,
    reader: ArtifactReader,
    executor: ActionExecutor,
    crew: Crew,
    settings: LoopSettings,
    ui: Option<Arc<OrchestratorUI>>,
    started_at: DateTime<Local>,
}

impl Orchestrator {
    pub fn new(workspace: Workspace, crew: Crew, templates: Templates, settings: LoopSettings) -> Self {
        Self {
            reader: ArtifactReader::new(workspace.clone()),
            executor: ActionExecutor::new(workspace.clone(), templates),
            workspace,
            crew,
            settings,
            ui: None,
            started_at: Local::now(),
        }
    }

    pub fn with_ui(mut self, ui: Option<Arc<OrchestratorUI>>) -> Self {
        self.executor = self.executor.with_ui(ui.clone());
        self.ui = ui;
        self
    }

    pub fn with_halt_rendering(mut self, enabled: bool) -> Self {
        self.executor = self.executor.with_halt_rendering(enabled);
        self
    }

    /// Timestamp naming the run's log and record files.
    pub fn with_started_at(mut self, at: DateTime<Local>) -> Self {
        self.started_at = at;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Drive the project until a halting action or the iteration cap.
    ///
    /// Sessions are released on return; if the future is dropped or a step
    /// panics, dropping the crew releases them instead.
    pub async fn run(mut self) -> RunReport {
        let report = self.drive().await;
        self.crew.release_all();
        report
    }

    async fn drive(&mut self) -> RunReport {
        let project = self.workspace.project_name().to_string();
        let mut run_log = self.start_run_log();
        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut last_error: Option<String> = None;
        let mut outcome = RunOutcome::IterationBudgetExhausted {
            max_iterations: self.settings.max_iterations,
        };

        if let Some(ui) = &self.ui {
            ui.print_run_header(&project, self.workspace.path(), self.settings.max_iterations);
        }
        tracing::info!(
            project = %project,
            max_iterations = self.settings.max_iterations,
            "orchestration started"
        );

        for iteration in 1..=self.settings.max_iterations {
            let state = assess(&self.reader).with_last_error(last_error.clone());
            let action = self
                .failure_guard(&history)
                .unwrap_or_else(|| decide(&state));
            tracing::info!(
                project = %project,
                iteration,
                phase = %state.phase(),
                action = %action.action_type(),
                reason = %action.reason,
                "action chosen"
            );
            if let Some(ui) = &self.ui {
                ui.start_iteration(iteration, state.phase());
                ui.start_action(&action);
            }

            let started_at = Local::now();
            let clock = Instant::now();
            let result = self.executor.execute(&action, &state, &mut self.crew).await;
            let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

            if let Some(ui) = &self.ui {
                match &result {
                    ActionOutcome::Completed { summary, .. } => {
                        ui.action_succeeded(action.action_type(), summary)
                    }
                    ActionOutcome::Failed { error } => ui.action_failed(action.action_type(), error),
                    ActionOutcome::Halted => ui.action_halted(action.action_type()),
                }
            }
            match &result {
                ActionOutcome::Failed { error } => last_error = Some(error.clone()),
                ActionOutcome::Completed { .. } => last_error = None,
                ActionOutcome::Halted => {}
            }

            let entry = HistoryEntry {
                iteration,
                phase: state.phase(),
                action: action.action_type(),
                reason: action.reason.clone(),
                inputs: action.inputs(),
                outcome: result,
                started_at,
                duration_ms,
            };
            if let Some(log) = run_log.as_mut()
                && let Err(e) = log.record(entry.clone())
            {
                tracing::warn!(error = %format!("{:#}", e), "run record not updated");
            }
            history.push(entry);

            if let Some(halt) = RunOutcome::from_terminal(&action) {
                outcome = halt;
                break;
            }
            if iteration < self.settings.max_iterations && self.settings.pacing_ms > 0 {
                tokio::time::sleep(self.settings.pacing()).await;
            }
        }

        let final_phase = assess(&self.reader).phase();
        tracing::info!(
            project = %project,
            outcome = outcome.label(),
            final_phase = %final_phase,
            iterations = history.len(),
            "orchestration finished"
        );
        if let Some(ui) = &self.ui {
            ui.finish(outcome.label());
        }

        let run_record = run_log.and_then(|log| match log.finish(outcome.clone(), final_phase) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "run record not finalized");
                None
            }
        });

        RunReport {
            project,
            outcome,
            history,
            final_phase,
            run_record,
        }
    }

    /// A run record is only kept for a workspace that already exists.
    fn start_run_log(&self) -> Option<RunLog> {
        if !self.workspace.exists() {
            return None;
        }
        let path = self
            .workspace
            .logs_dir()
            .join(format!("{}.json", self.workspace.orchestration_stem(self.started_at)));
        match RunLog::start(&path, self.workspace.project_name(), self.settings) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "run record disabled");
                None
            }
        }
    }

    /// Replace the decision with an abort once the last N actions all failed.
    fn failure_guard(&self, history: &[HistoryEntry]) -> Option<Action> {
        let limit = self.settings.max_consecutive_failures as usize;
        if limit == 0 || history.len() < limit {
            return None;
        }
        let recent = &history[history.len() - limit..];
        if !recent.iter().all(|e| e.outcome.is_failure()) {
            return None;
        }
        let last = recent.last()?;
        Some(Action::abort(format!(
            "{} failed {} times in a row; last error: {}",
            last.action,
            limit,
            last.outcome.error().unwrap_or("unknown")
        )))
    }
}
