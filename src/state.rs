//! Phase inference.
//!
//! A `ProjectState` is rebuilt from the filesystem at the start of every loop
//! iteration. Its phase is derived from the artifact facts and cannot be set
//! directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::workspace::{ArtifactFacts, ArtifactReader};

/// How far a project has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    ArchitecturalDialogue,
    DocumentationSynthesis,
    Implementation,
    Audit,
    Complete,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::ArchitecturalDialogue => "architectural_dialogue",
            Phase::DocumentationSynthesis => "documentation_synthesis",
            Phase::Implementation => "implementation",
            Phase::Audit => "audit",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The inference rule that classified a state, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRule {
    NoRequirements,
    NoConsensus,
    DocsMissing,
    CodeMissing,
    AuditMissing,
    AuditFailed,
    AuditPassed,
    Unclassified,
}

impl PhaseRule {
    /// Rules in evaluation order. The first whose guard holds wins.
    pub const ORDER: [PhaseRule; 8] = [
        PhaseRule::NoRequirements,
        PhaseRule::NoConsensus,
        PhaseRule::DocsMissing,
        PhaseRule::CodeMissing,
        PhaseRule::AuditMissing,
        PhaseRule::AuditFailed,
        PhaseRule::AuditPassed,
        PhaseRule::Unclassified,
    ];

    /// The rule's own condition; earlier rules are assumed not to hold.
    fn guard(self, f: &ArtifactFacts) -> bool {
        match self {
            PhaseRule::NoRequirements => !f.has_requirements,
            PhaseRule::NoConsensus => !f.has_conversation || !f.dialogue_consensus,
            PhaseRule::DocsMissing => !f.has_architecture_doc || !f.has_constraints_doc,
            PhaseRule::CodeMissing => !f.has_code,
            PhaseRule::AuditMissing => !f.has_audit_log,
            PhaseRule::AuditFailed => f.audit_passed == Some(false),
            PhaseRule::AuditPassed => f.audit_passed == Some(true),
            PhaseRule::Unclassified => true,
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            PhaseRule::NoRequirements => Phase::Uninitialized,
            PhaseRule::NoConsensus => Phase::ArchitecturalDialogue,
            PhaseRule::DocsMissing => Phase::DocumentationSynthesis,
            PhaseRule::CodeMissing => Phase::Implementation,
            PhaseRule::AuditMissing => Phase::Audit,
            PhaseRule::AuditFailed => Phase::Failed,
            PhaseRule::AuditPassed => Phase::Complete,
            PhaseRule::Unclassified => Phase::Uninitialized,
        }
    }
}

/// Classify a set of facts. Total: `Unclassified` catches anything the other
/// rules miss.
pub fn infer_phase(facts: &ArtifactFacts) -> PhaseRule {
    PhaseRule::ORDER
        .into_iter()
        .find(|rule| rule.guard(facts))
        .unwrap_or(PhaseRule::Unclassified)
}

/// Snapshot of a project, derived from its workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectState {
    project_name: String,
    workspace_path: PathBuf,
    facts: ArtifactFacts,
    rule: PhaseRule,
    last_error: Option<String>,
}

impl ProjectState {
    pub fn from_facts(project_name: &str, workspace_path: &Path, facts: ArtifactFacts) -> Self {
        let rule = infer_phase(&facts);
        Self {
            project_name: project_name.to_string(),
            workspace_path: workspace_path.to_path_buf(),
            facts,
            rule,
            last_error: None,
        }
    }

    /// Attach the previous action's failure for operator visibility.
    pub fn with_last_error(mut self, error: Option<String>) -> Self {
        self.last_error = error;
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    pub fn facts(&self) -> &ArtifactFacts {
        &self.facts
    }

    pub fn phase(&self) -> Phase {
        self.rule.phase()
    }

    pub fn rule(&self) -> PhaseRule {
        self.rule
    }

    /// True when phase inference fell through every rule.
    pub fn is_anomalous(&self) -> bool {
        self.rule == PhaseRule::Unclassified
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn human_feedback(&self) -> Option<&str> {
        self.facts.human_feedback.as_deref()
    }
}

/// Read the workspace and classify it.
pub fn assess(reader: &ArtifactReader) -> ProjectState {
    let ws = reader.workspace();
    let state = ProjectState::from_facts(ws.project_name(), ws.path(), reader.read_facts());
    if state.is_anomalous() {
        tracing::warn!(
            project = %state.project_name(),
            facts = ?state.facts(),
            "phase inference fell through every rule"
        );
    } else {
        tracing::debug!(
            project = %state.project_name(),
            phase = %state.phase(),
            rule = ?state.rule(),
            "assessed workspace"
        );
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{Workspace, write_artifact};
    use tempfile::tempdir;

    fn facts_through(stage: usize) -> ArtifactFacts {
        ArtifactFacts {
            has_requirements: stage >= 1,
            has_conversation: stage >= 2,
            dialogue_consensus: stage >= 2,
            has_architecture_doc: stage >= 3,
            has_constraints_doc: stage >= 3,
            has_code: stage >= 4,
            has_audit_log: stage >= 5,
            audit_passed: if stage >= 5 { Some(true) } else { None },
            ..Default::default()
        }
    }

    fn all_snapshots() -> Vec<ArtifactFacts> {
        let mut out = Vec::new();
        for bits in 0u32..(1 << 7) {
            for audit in [None, Some(false), Some(true)] {
                let bit = |n: u32| bits & (1 << n) != 0;
                out.push(ArtifactFacts {
                    has_requirements: bit(0),
                    has_conversation: bit(1),
                    dialogue_consensus: bit(2),
                    has_architecture_doc: bit(3),
                    has_constraints_doc: bit(4),
                    has_code: bit(5),
                    has_audit_log: bit(6),
                    audit_passed: audit,
                    ..Default::default()
                });
            }
        }
        out
    }

    #[test]
    fn test_happy_path_stages_map_to_phases_in_order() {
        let phases: Vec<Phase> = (0..=5).map(|s| infer_phase(&facts_through(s)).phase()).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Uninitialized,
                Phase::ArchitecturalDialogue,
                Phase::DocumentationSynthesis,
                Phase::Implementation,
                Phase::Audit,
                Phase::Complete,
            ]
        );
    }

    #[test]
    fn test_conversation_without_consensus_stays_in_dialogue() {
        let facts = ArtifactFacts {
            dialogue_consensus: false,
            ..facts_through(5)
        };
        assert_eq!(infer_phase(&facts), PhaseRule::NoConsensus);
    }

    #[test]
    fn test_one_missing_doc_is_enough_for_synthesis() {
        let facts = ArtifactFacts {
            has_constraints_doc: false,
            ..facts_through(5)
        };
        assert_eq!(infer_phase(&facts).phase(), Phase::DocumentationSynthesis);
    }

    #[test]
    fn test_failed_audit_is_failed() {
        let facts = ArtifactFacts {
            audit_passed: Some(false),
            ..facts_through(5)
        };
        assert_eq!(infer_phase(&facts).phase(), Phase::Failed);
    }

    #[test]
    fn test_unreadable_audit_falls_through_to_unclassified() {
        let facts = ArtifactFacts {
            audit_passed: None,
            ..facts_through(5)
        };
        let rule = infer_phase(&facts);
        assert_eq!(rule, PhaseRule::Unclassified);
        assert_eq!(rule.phase(), Phase::Uninitialized);
    }

    #[test]
    fn test_exactly_one_rule_classifies_every_snapshot() {
        for facts in all_snapshots() {
            let first = infer_phase(&facts);
            let position = PhaseRule::ORDER.iter().position(|r| *r == first).unwrap();
            // No earlier rule applies and the chosen one does.
            assert!(
                PhaseRule::ORDER[..position]
                    .iter()
                    .all(|r| !r.guard(&facts))
            );
            assert!(first.guard(&facts));
            // Fall-through only happens with an audit log whose verdict is unknown.
            if first == PhaseRule::Unclassified {
                assert!(facts.has_audit_log && facts.audit_passed.is_none());
            }
        }
    }

    #[test]
    fn test_state_from_same_snapshot_is_equal() {
        let path = Path::new("/ws/demo");
        let a = ProjectState::from_facts("demo", path, facts_through(3));
        let b = ProjectState::from_facts("demo", path, facts_through(3));
        assert_eq!(a, b);
        assert_eq!(a.phase(), Phase::Implementation);
    }

    #[test]
    fn test_assess_is_deterministic_on_disk() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path(), "demo").unwrap();
        ws.init("a todo app", false).unwrap();
        write_artifact(
            &ws.conversation_dir().join("dialogue_20250101_000000.md"),
            "# Architectural Dialogue\n\n---\n\n## Architect\n\nCONSENSUS: Hugo\n\n---\n\n## Coder\n\nAGREED\n",
        )
        .unwrap();
        let reader = ArtifactReader::new(ws);
        let first = assess(&reader);
        let second = assess(&reader);
        assert_eq!(first, second);
        assert_eq!(first.phase(), Phase::DocumentationSynthesis);
    }

    #[test]
    fn test_assess_never_sets_last_error() {
        let dir = tempdir().unwrap();
        let reader = ArtifactReader::new(Workspace::new(dir.path(), "demo").unwrap());
        let state = assess(&reader);
        assert_eq!(state.last_error(), None);
        let state = state.with_last_error(Some("timeout".into()));
        assert_eq!(state.last_error(), Some("timeout"));
    }

    #[test]
    fn test_phase_display_is_snake_case() {
        assert_eq!(Phase::ArchitecturalDialogue.to_string(), "architectural_dialogue");
        assert_eq!(
            serde_json::to_string(&Phase::DocumentationSynthesis).unwrap(),
            "\"documentation_synthesis\""
        );
    }
}
