//! The decision policy: one action per project state.
//!
//! `decide` is pure and memoryless. It sees only the current `ProjectState`, never
//! the history of a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::state::{Phase, ProjectState};
use crate::workspace::{ARCHITECTURE_DIR, ARCHITECTURE_DOC, CODE_DIR, CONSTRAINTS_DOC, REQUIREMENTS_FILE};

/// Flat action type, used for reporting and exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RunDialogue,
    SynthesizeDocs,
    ImplementCode,
    RunAudit,
    UpdateDocs,
    AskHuman,
    Complete,
    Abort,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::RunDialogue => "run_dialogue",
            ActionType::SynthesizeDocs => "synthesize_docs",
            ActionType::ImplementCode => "implement_code",
            ActionType::RunAudit => "run_audit",
            ActionType::UpdateDocs => "update_docs",
            ActionType::AskHuman => "ask_human",
            ActionType::Complete => "complete",
            ActionType::Abort => "abort",
        }
    }

    /// Halting actions end the orchestration loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionType::AskHuman | ActionType::Complete | ActionType::Abort
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution options offered when an audit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanOption {
    FixImplementation,
    ReviseArchitecture,
    AcceptViolations,
}

impl HumanOption {
    pub const AUDIT_FAILED: [HumanOption; 3] = [
        HumanOption::FixImplementation,
        HumanOption::ReviseArchitecture,
        HumanOption::AcceptViolations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HumanOption::FixImplementation => "fix_implementation",
            HumanOption::ReviseArchitecture => "revise_architecture",
            HumanOption::AcceptViolations => "accept_violations",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HumanOption::FixImplementation => "archive the code and re-implement from the same docs",
            HumanOption::ReviseArchitecture => "revise the docs from the audit findings, then re-implement",
            HumanOption::AcceptViolations => "record the violations as accepted and mark the audit passed",
        }
    }
}

impl fmt::Display for HumanOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HumanOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fix_implementation" | "fix" => Ok(HumanOption::FixImplementation),
            "revise_architecture" | "revise" => Ok(HumanOption::ReviseArchitecture),
            "accept_violations" | "accept" => Ok(HumanOption::AcceptViolations),
            other => Err(format!(
                "unknown option '{}', expected one of: fix_implementation, revise_architecture, accept_violations",
                other
            )),
        }
    }
}

/// What to do, with the paths the executor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    RunDialogue {
        requirements: PathBuf,
        /// Transcript of a previous dialogue without consensus.
        resume_from: Option<PathBuf>,
    },
    SynthesizeDocs {
        transcript: PathBuf,
        architecture_doc: PathBuf,
        constraints_doc: PathBuf,
    },
    ImplementCode {
        architecture_doc: PathBuf,
        constraints_doc: PathBuf,
        code_dir: PathBuf,
    },
    RunAudit {
        constraints_doc: PathBuf,
        code_dir: PathBuf,
    },
    UpdateDocs {
        architecture_doc: PathBuf,
        constraints_doc: PathBuf,
        audit_log: Option<PathBuf>,
    },
    AskHuman {
        options: Vec<HumanOption>,
    },
    Complete,
    Abort,
}

/// A single unit of work chosen for one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    pub reason: String,
}

impl Action {
    pub fn new(kind: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn ask_human(reason: impl Into<String>, options: Vec<HumanOption>) -> Self {
        Self::new(ActionKind::AskHuman { options }, reason)
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self::new(ActionKind::Abort, reason)
    }

    pub fn action_type(&self) -> ActionType {
        match &self.kind {
            ActionKind::RunDialogue { .. } => ActionType::RunDialogue,
            ActionKind::SynthesizeDocs { .. } => ActionType::SynthesizeDocs,
            ActionKind::ImplementCode { .. } => ActionType::ImplementCode,
            ActionKind::RunAudit { .. } => ActionType::RunAudit,
            ActionKind::UpdateDocs { .. } => ActionType::UpdateDocs,
            ActionKind::AskHuman { .. } => ActionType::AskHuman,
            ActionKind::Complete => ActionType::Complete,
            ActionKind::Abort => ActionType::Abort,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.action_type().is_terminal()
    }

    /// Operator options, empty unless this is `AskHuman`.
    pub fn options(&self) -> &[HumanOption] {
        match &self.kind {
            ActionKind::AskHuman { options } => options,
            _ => &[],
        }
    }

    /// Named inputs as strings, for logs and the run record.
    pub fn inputs(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            map.insert(key.to_string(), value);
        };
        let path = |p: &PathBuf| p.display().to_string();
        match &self.kind {
            ActionKind::RunDialogue {
                requirements,
                resume_from,
            } => {
                put("requirements", path(requirements));
                if let Some(prev) = resume_from {
                    put("resume_from", path(prev));
                }
            }
            ActionKind::SynthesizeDocs {
                transcript,
                architecture_doc,
                constraints_doc,
            } => {
                put("transcript", path(transcript));
                put("architecture_doc", path(architecture_doc));
                put("constraints_doc", path(constraints_doc));
            }
            ActionKind::ImplementCode {
                architecture_doc,
                constraints_doc,
                code_dir,
            } => {
                put("architecture_doc", path(architecture_doc));
                put("constraints_doc", path(constraints_doc));
                put("code_dir", path(code_dir));
            }
            ActionKind::RunAudit {
                constraints_doc,
                code_dir,
            } => {
                put("constraints_doc", path(constraints_doc));
                put("code_dir", path(code_dir));
            }
            ActionKind::UpdateDocs {
                architecture_doc,
                constraints_doc,
                audit_log,
            } => {
                put("architecture_doc", path(architecture_doc));
                put("constraints_doc", path(constraints_doc));
                if let Some(log) = audit_log {
                    put("audit_log", path(log));
                }
            }
            ActionKind::AskHuman { options } => {
                if !options.is_empty() {
                    let joined: Vec<&str> = options.iter().map(|o| o.as_str()).collect();
                    put("options", joined.join(","));
                }
            }
            ActionKind::Complete | ActionKind::Abort => {}
        }
        map
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action_type(), self.reason)
    }
}

pub const REASON_NEED_REQUIREMENTS: &str =
    "No requirements.md in the workspace. A project description is needed before anything can start.";
pub const REASON_START_DIALOGUE: &str =
    "No architectural conversation yet. Starting the architect/coder dialogue.";
pub const REASON_RESUME_DIALOGUE: &str =
    "Latest conversation ended without consensus. Continuing the dialogue.";
pub const REASON_SYNTHESIZE: &str =
    "Dialogue reached consensus but architecture docs are missing. Synthesizing documentation.";
pub const REASON_IMPLEMENT: &str =
    "Architecture and constraints are documented but there is no code. Starting implementation.";
pub const REASON_AUDIT: &str =
    "Code exists but has not been audited. Checking it against the constraints.";
pub const REASON_AUDIT_FAILED: &str =
    "Audit found constraint violations. Choose whether to fix the implementation, revise the architecture or accept the violations.";
pub const REASON_COMPLETE: &str =
    "Project complete: docs synthesized, code implemented, audit passed.";

/// Pick the next action for a project state.
pub fn decide(state: &ProjectState) -> Action {
    let ws = state.workspace_path();
    let facts = state.facts();
    let architecture_doc = ws.join(ARCHITECTURE_DIR).join(ARCHITECTURE_DOC);
    let constraints_doc = ws.join(ARCHITECTURE_DIR).join(CONSTRAINTS_DOC);

    if state.is_anomalous() {
        return Action::ask_human(
            format!(
                "Workspace state could not be classified (phase {}, audit verdict unknown). Inspect {} by hand.",
                state.phase(),
                facts
                    .latest_audit_log
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "the workspace".to_string()),
            ),
            Vec::new(),
        );
    }

    match state.phase() {
        Phase::Uninitialized => Action::ask_human(REASON_NEED_REQUIREMENTS, Vec::new()),
        Phase::ArchitecturalDialogue => {
            let requirements = ws.join(REQUIREMENTS_FILE);
            match (&facts.latest_conversation, facts.has_conversation) {
                (Some(previous), true) => Action::new(
                    ActionKind::RunDialogue {
                        requirements,
                        resume_from: Some(previous.clone()),
                    },
                    REASON_RESUME_DIALOGUE,
                ),
                _ => Action::new(
                    ActionKind::RunDialogue {
                        requirements,
                        resume_from: None,
                    },
                    REASON_START_DIALOGUE,
                ),
            }
        }
        // Consensus implies a conversation, so the latest transcript is known.
        Phase::DocumentationSynthesis => Action::new(
            ActionKind::SynthesizeDocs {
                transcript: facts.latest_conversation.clone().unwrap_or_default(),
                architecture_doc,
                constraints_doc,
            },
            REASON_SYNTHESIZE,
        ),
        Phase::Implementation => Action::new(
            ActionKind::ImplementCode {
                architecture_doc,
                constraints_doc,
                code_dir: ws.join(CODE_DIR),
            },
            REASON_IMPLEMENT,
        ),
        Phase::Audit => Action::new(
            ActionKind::RunAudit {
                constraints_doc,
                code_dir: ws.join(CODE_DIR),
            },
            REASON_AUDIT,
        ),
        Phase::Failed => Action::ask_human(REASON_AUDIT_FAILED, HumanOption::AUDIT_FAILED.to_vec()),
        Phase::Complete => Action::new(ActionKind::Complete, REASON_COMPLETE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::ArtifactFacts;
    use std::collections::HashSet;
    use std::path::Path;

    fn state(facts: ArtifactFacts) -> ProjectState {
        ProjectState::from_facts("demo", Path::new("/ws/demo"), facts)
    }

    fn complete_facts() -> ArtifactFacts {
        ArtifactFacts {
            has_requirements: true,
            has_conversation: true,
            dialogue_consensus: true,
            has_architecture_doc: true,
            has_constraints_doc: true,
            has_code: true,
            has_implementation_log: true,
            has_audit_log: true,
            audit_passed: Some(true),
            latest_conversation: Some(PathBuf::from("/ws/demo/conversation/dialogue_1.md")),
            latest_audit_log: Some(PathBuf::from("/ws/demo/logs/audit_1.md")),
            human_feedback: None,
        }
    }

    #[test]
    fn test_no_requirements_asks_for_them() {
        let action = decide(&state(ArtifactFacts::default()));
        assert_eq!(action.action_type(), ActionType::AskHuman);
        assert!(action.options().is_empty());
        assert!(action.reason.contains("requirements"));
    }

    #[test]
    fn test_fresh_dialogue_has_no_resume() {
        let action = decide(&state(ArtifactFacts {
            has_requirements: true,
            ..Default::default()
        }));
        assert_eq!(
            action.kind,
            ActionKind::RunDialogue {
                requirements: PathBuf::from("/ws/demo/requirements.md"),
                resume_from: None,
            }
        );
        assert_eq!(action.reason, REASON_START_DIALOGUE);
    }

    #[test]
    fn test_dialogue_without_consensus_resumes_latest() {
        let action = decide(&state(ArtifactFacts {
            dialogue_consensus: false,
            ..complete_facts()
        }));
        match &action.kind {
            ActionKind::RunDialogue { resume_from, .. } => {
                assert_eq!(
                    resume_from.as_deref(),
                    Some(Path::new("/ws/demo/conversation/dialogue_1.md"))
                );
            }
            other => panic!("expected RunDialogue, got {:?}", other),
        }
        assert_eq!(action.reason, REASON_RESUME_DIALOGUE);
    }

    #[test]
    fn test_failed_audit_offers_three_options() {
        let action = decide(&state(ArtifactFacts {
            audit_passed: Some(false),
            ..complete_facts()
        }));
        assert_eq!(action.action_type(), ActionType::AskHuman);
        let options: HashSet<&str> = action.options().iter().map(|o| o.as_str()).collect();
        assert_eq!(
            options,
            HashSet::from(["fix_implementation", "revise_architecture", "accept_violations"])
        );
    }

    #[test]
    fn test_unclassified_state_asks_human() {
        let action = decide(&state(ArtifactFacts {
            audit_passed: None,
            ..complete_facts()
        }));
        assert_eq!(action.action_type(), ActionType::AskHuman);
        assert!(action.reason.contains("could not be classified"));
    }

    #[test]
    fn test_complete_state_completes() {
        let action = decide(&state(complete_facts()));
        assert_eq!(action.kind, ActionKind::Complete);
        assert!(action.is_terminal());
    }

    #[test]
    fn test_decide_is_pure() {
        let s = state(ArtifactFacts {
            has_code: false,
            ..complete_facts()
        });
        assert_eq!(decide(&s), decide(&s.clone()));
        assert_eq!(decide(&s).action_type(), ActionType::ImplementCode);
    }

    #[test]
    fn test_every_branch_has_a_distinct_reason() {
        let snapshots = vec![
            ArtifactFacts::default(),
            ArtifactFacts {
                has_requirements: true,
                ..Default::default()
            },
            ArtifactFacts {
                dialogue_consensus: false,
                ..complete_facts()
            },
            ArtifactFacts {
                has_architecture_doc: false,
                ..complete_facts()
            },
            ArtifactFacts {
                has_code: false,
                ..complete_facts()
            },
            ArtifactFacts {
                has_audit_log: false,
                audit_passed: None,
                ..complete_facts()
            },
            ArtifactFacts {
                audit_passed: Some(false),
                ..complete_facts()
            },
            complete_facts(),
            ArtifactFacts {
                audit_passed: None,
                ..complete_facts()
            },
        ];
        let reasons: HashSet<String> = snapshots
            .into_iter()
            .map(|f| decide(&state(f)).reason)
            .collect();
        assert_eq!(reasons.len(), 9);
    }

    #[test]
    fn test_human_option_parses_aliases() {
        assert_eq!(
            "revise-architecture".parse::<HumanOption>().unwrap(),
            HumanOption::ReviseArchitecture
        );
        assert_eq!("fix".parse::<HumanOption>().unwrap(), HumanOption::FixImplementation);
        assert!("retry".parse::<HumanOption>().is_err());
    }

    #[test]
    fn test_inputs_name_the_paths() {
        let action = decide(&state(ArtifactFacts {
            has_audit_log: false,
            audit_passed: None,
            ..complete_facts()
        }));
        let inputs = action.inputs();
        assert_eq!(inputs.get("code_dir").map(String::as_str), Some("/ws/demo/code"));
        assert!(inputs.contains_key("constraints_doc"));
    }
}
