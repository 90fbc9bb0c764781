//! Persona system prompts and per-call prompt builders.
//!
//! The engine reads collaborator output only through the markers in
//! `crate::markers`; these prompts ask for them explicitly.

use super::Role;
use crate::markers::{AGREED, CONSENSUS, FAIL, PASS};

pub const ARCHITECT_PERSONA: &str = "You are a software architect. Propose concrete tech stacks and \
architectures. Explain trade-offs. Make pragmatic decisions. When you see feedback from a coder, \
respond directly to their points. Signal 'CONSENSUS:' when finalizing.";

pub const CODER_PERSONA: &str = "You are an implementation engineer. Evaluate architectural proposals \
for feasibility. Suggest practical alternatives. Challenge over-engineering. Estimate effort. \
Signal 'AGREED:' when satisfied.";

pub const DOCS_PERSONA: &str = "You are a documentation synthesizer. Read conversations and output \
structured markdown documentation. Output the complete document as text. Do not use tools and do \
not try to write files. Preserve decisions, trade-offs and the rationale behind them.";

pub const IMPLEMENTER_PERSONA: &str = "You are an implementation engineer. You receive architecture \
documentation and constraints and implement working code that follows them exactly. Use the Write \
tool to create files, only inside the code/ directory.";

pub const AUDITOR_PERSONA: &str = "You are a constraint validation agent. Check code against the \
defined constraints. Report violations and compliance status. Be mechanical and objective and flag \
any deviation from the stated rules.";

pub fn persona(role: Role) -> &'static str {
    match role {
        Role::Architect => ARCHITECT_PERSONA,
        Role::Coder => CODER_PERSONA,
        Role::Docs => DOCS_PERSONA,
        Role::Implementer => IMPLEMENTER_PERSONA,
        Role::Auditor => AUDITOR_PERSONA,
    }
}

/// The two synthesized documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Architecture,
    Constraints,
}

impl DocKind {
    pub const BOTH: [DocKind; 2] = [DocKind::Architecture, DocKind::Constraints];

    pub fn file_name(&self) -> &'static str {
        match self {
            DocKind::Architecture => crate::workspace::ARCHITECTURE_DOC,
            DocKind::Constraints => crate::workspace::CONSTRAINTS_DOC,
        }
    }

    fn focus(&self) -> &'static str {
        match self {
            DocKind::Architecture => {
                "Extract every architectural decision, tech stack choice, trade-off and its rationale."
            }
            DocKind::Constraints => {
                "Extract every constraint, performance budget, testing requirement and rule. Make each \
                 constraint testable and specific, including any numbers mentioned."
            }
        }
    }
}

fn feedback_section(feedback: Option<&str>) -> String {
    match feedback {
        Some(text) => format!("\nOPERATOR FEEDBACK (takes precedence):\n{}\n", text),
        None => String::new(),
    }
}

/// Architect's first turn. A previous transcript without consensus is carried
/// so the dialogue continues instead of restarting.
pub fn architect_opening(requirements: &str, previous: Option<&str>) -> String {
    let previous = match previous {
        Some(transcript) => format!(
            "\nA previous round of this dialogue ended without agreement:\n\n{}\n\n\
             Address the open points from that round.\n",
            transcript
        ),
        None => String::new(),
    };
    format!(
        "Project requirements:\n{}\n{}\n\
         Propose a specific tech stack and architecture: framework, styling, data handling, \
         testing and hosting. Be specific and concrete. Start your answer with '{}:' once the \
         design is final.",
        requirements, previous, CONSENSUS
    )
}

pub fn coder_evaluation(proposal: &str) -> String {
    format!(
        "The architect proposed this architecture:\n\n{}\n\n\
         Evaluate this proposal. What do you agree with? What concerns do you have? Any better \
         alternatives? Estimate implementation effort. Say '{}:' if it is buildable as proposed.",
        proposal, AGREED
    )
}

pub fn architect_response(evaluation: &str) -> String {
    format!(
        "The coder's evaluation:\n\n{}\n\n\
         Respond to their feedback. Address concerns, refine the architecture or defend your \
         choices. Move toward agreement and signal '{}:' with the final design.",
        evaluation, CONSENSUS
    )
}

pub fn coder_final(response: &str) -> String {
    format!(
        "The architect's response:\n\n{}\n\n\
         Final evaluation. Signal '{}:' if the architecture is good, or raise your final concerns.",
        response, AGREED
    )
}

pub fn synthesis(kind: DocKind, transcript: &str, template: &str, feedback: Option<&str>) -> String {
    format!(
        "Read this architect/coder dialogue and output the complete {name} content as markdown.\n\n\
         CONVERSATION:\n{transcript}\n\n\
         TEMPLATE TO FOLLOW:\n{template}\n{feedback}\n\
         TASK: {focus} Follow the template format and replace every placeholder with content \
         from the conversation.\n\n\
         Do not use tools. Your entire response is saved as {name}.",
        name = kind.file_name(),
        transcript = transcript,
        template = template,
        feedback = feedback_section(feedback),
        focus = kind.focus(),
    )
}

pub fn revision(kind: DocKind, current: &str, audit: Option<&str>, feedback: Option<&str>) -> String {
    let audit = audit
        .map(|a| format!("\nAUDIT REPORT:\n{}\n", a))
        .unwrap_or_default();
    format!(
        "The implementation failed its audit and the architecture is being revised.\n\n\
         CURRENT {name}:\n{current}\n{audit}{feedback}\n\
         Output the complete revised {name}. Keep what still holds and change what the audit \
         and feedback show to be wrong or unrealistic.\n\n\
         Do not use tools. Your entire response is saved as {name}.",
        name = kind.file_name(),
        current = current,
        audit = audit,
        feedback = feedback_section(feedback),
    )
}

pub fn implementation(
    architecture: &str,
    constraints: &str,
    code_dir: &str,
    feedback: Option<&str>,
) -> String {
    format!(
        "You have the full architecture and constraints for this project.\n\n\
         ARCHITECTURE.md:\n{architecture}\n\n\
         CONSTRAINTS.md:\n{constraints}\n{feedback}\n\
         Implement the project exactly as documented. Create every file a working implementation \
         needs: config, sources and tests. Write files only under {code_dir}/. Writes anywhere else \
         are rejected.",
        architecture = architecture,
        constraints = constraints,
        feedback = feedback_section(feedback),
        code_dir = code_dir,
    )
}

pub fn audit(constraints: &str, code_tree: &str) -> String {
    format!(
        "Audit this implementation against its constraints.\n\n\
         CONSTRAINTS.md:\n{constraints}\n\n\
         CODE:\n{code_tree}\n\n\
         Check each constraint and list every violation with the file it occurs in. End with \
         exactly one line, either 'VERDICT: {pass}' when every constraint holds or \
         'VERDICT: {fail}' otherwise. Use neither word anywhere else.",
        constraints = constraints,
        code_tree = code_tree,
        pass = PASS,
        fail = FAIL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personas_request_their_markers() {
        assert!(persona(Role::Architect).contains(CONSENSUS));
        assert!(persona(Role::Coder).contains(AGREED));
    }

    #[test]
    fn test_opening_carries_previous_transcript() {
        let fresh = architect_opening("a todo app", None);
        assert!(fresh.contains("a todo app"));
        assert!(!fresh.contains("previous round"));

        let resumed = architect_opening("a todo app", Some("## Architect\n\nUse Vue"));
        assert!(resumed.contains("previous round"));
        assert!(resumed.contains("Use Vue"));
    }

    #[test]
    fn test_synthesis_names_target_and_includes_feedback() {
        let prompt = synthesis(DocKind::Constraints, "dialogue", "# CONSTRAINTS", Some("no jquery"));
        assert!(prompt.contains("CONSTRAINTS.md"));
        assert!(prompt.contains("dialogue"));
        assert!(prompt.contains("no jquery"));
        assert!(!synthesis(DocKind::Architecture, "d", "t", None).contains("OPERATOR FEEDBACK"));
    }

    #[test]
    fn test_audit_asks_for_verdict_line() {
        let prompt = audit("- bundle < 100kb", "code/app.js");
        assert!(prompt.contains("VERDICT: PASS"));
        assert!(prompt.contains("VERDICT: FAIL"));
    }

    #[test]
    fn test_implementation_names_code_dir() {
        let prompt = implementation("arch", "cons", "/ws/demo/code", None);
        assert!(prompt.contains("/ws/demo/code/"));
    }
}
