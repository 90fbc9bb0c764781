//! Operator resolution of a failed audit.
//!
//! Each option rewrites the workspace so the next assessment lands in a phase
//! the loop can continue from.

use chrono::Local;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::agents::Crew;
use crate::decision::{Action, ActionKind, HumanOption};
use crate::errors::ResolveError;
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::state::{Phase, ProjectState, assess};
use crate::workspace::{ArtifactReader, Workspace, read_artifact, write_artifact};

#[derive(Debug, Clone)]
pub struct Resolution {
    pub option: HumanOption,
    pub feedback: PathBuf,
    /// Archive directory holding the set-aside code and audit logs.
    pub archived: Option<PathBuf>,
    pub written: Vec<PathBuf>,
    pub next_phase: Phase,
}

pub async fn resolve(
    workspace: &Workspace,
    option: HumanOption,
    note: Option<&str>,
    executor: &ActionExecutor,
    crew: &mut Crew,
) -> Result<Resolution, ResolveError> {
    let reader = ArtifactReader::new(workspace.clone());
    let state = assess(&reader);
    if state.phase() != Phase::Failed {
        return Err(ResolveError::NotFailed {
            phase: state.phase(),
        });
    }
    let latest_audit = state.facts().latest_audit_log.clone();
    let audit_text = latest_audit.as_deref().map(read_artifact).transpose()?;
    tracing::info!(project = %workspace.project_name(), %option, "resolving failed audit");

    let feedback_body = feedback_text(option, note, audit_text.as_deref());
    let mut written = Vec::new();
    let mut archived = None;

    let feedback = match option {
        HumanOption::FixImplementation => {
            let feedback = workspace.write_feedback(&feedback_body)?;
            archived = Some(archive_attempt(workspace, &reader)?);
            feedback
        }
        HumanOption::ReviseArchitecture => {
            let action = Action::new(
                ActionKind::UpdateDocs {
                    architecture_doc: workspace.architecture_doc(),
                    constraints_doc: workspace.constraints_doc(),
                    audit_log: latest_audit.clone(),
                },
                "Operator chose to revise the architecture from the audit findings.",
            );
            // feedback.md is written only once the revision succeeds.
            let mut facts = reader.read_facts();
            facts.human_feedback = Some(feedback_body.trim().to_string());
            let state = ProjectState::from_facts(workspace.project_name(), workspace.path(), facts);
            match executor.execute(&action, &state, crew).await {
                ActionOutcome::Completed { artifacts, .. } => written.extend(artifacts),
                ActionOutcome::Failed { error } => return Err(ResolveError::RevisionFailed(error)),
                ActionOutcome::Halted => {}
            }
            let feedback = workspace.write_feedback(&feedback_body)?;
            archived = Some(archive_attempt(workspace, &reader)?);
            feedback
        }
        HumanOption::AcceptViolations => {
            let now = Local::now();
            let path = workspace.new_audit_log_path(now);
            let previous = latest_audit
                .as_deref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "the previous audit".to_string());
            let mut text = String::from("# Audit Report\n\n");
            let _ = writeln!(text, "**Date:** {}", now.format("%Y-%m-%d %H:%M:%S"));
            let _ = writeln!(text, "**Source:** operator resolution\n");
            let _ = writeln!(
                text,
                "Violations reported in {} were accepted by the operator. See feedback.md.\n",
                previous
            );
            text.push_str("VERDICT: PASS\n");
            write_artifact(&path, &text)?;
            written.push(path);
            workspace.write_feedback(&feedback_body)?
        }
    };

    let next_phase = assess(&reader).phase();
    tracing::info!(
        project = %workspace.project_name(),
        %option,
        next_phase = %next_phase,
        "resolution applied"
    );
    Ok(Resolution {
        option,
        feedback,
        archived,
        written,
        next_phase,
    })
}

/// Move the code tree and every audit log into `archive/<ts>/`.
fn archive_attempt(workspace: &Workspace, reader: &ArtifactReader) -> Result<PathBuf, ResolveError> {
    let mut paths = vec![workspace.code_dir()];
    paths.extend(reader.audit_logs());
    Ok(workspace.archive(&paths, Local::now())?)
}

fn feedback_text(option: HumanOption, note: Option<&str>, audit: Option<&str>) -> String {
    let mut out = format!("# Operator resolution: {}\n\n", option);
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => {
            let _ = writeln!(out, "{}\n", note);
        }
        None => {
            let _ = writeln!(out, "{}.\n", capitalize(option.description()));
        }
    }
    if option != HumanOption::AcceptViolations
        && let Some(audit) = audit
    {
        out.push_str("## Findings from the last audit\n\n");
        // Quote the findings so their verdict line reads as history, not a fresh verdict.
        for line in audit.lines() {
            let _ = writeln!(out, "> {}", line);
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{Scripted, ScriptedProvider};
    use crate::agents::{AgentReply, CrewSettings, Role};
    use crate::templates::Templates;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        workspace: Workspace,
        provider: ScriptedProvider,
        crew: Crew,
        executor: ActionExecutor,
    }

    fn failed_workspace() -> Fixture {
        let dir = tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), "blog").unwrap();
        workspace.init("A static blog.", false).unwrap();
        let ws = workspace.path();
        write_artifact(
            &ws.join("conversation/dialogue_20250101_000000.md"),
            "# Architectural Dialogue\n\n---\n\n## Architect\n\nCONSENSUS: Hugo\n\n---\n\n## Coder\n\nAGREED\n",
        )
        .unwrap();
        write_artifact(&workspace.architecture_doc(), "# Architecture").unwrap();
        write_artifact(&workspace.constraints_doc(), "# Constraints\n- no JS").unwrap();
        write_artifact(&ws.join("code/layouts/index.html"), "<script></script>").unwrap();
        write_artifact(
            &ws.join("logs/audit_20250101_000100.md"),
            "index.html ships JavaScript.\nVERDICT: FAIL",
        )
        .unwrap();

        let provider = ScriptedProvider::happy();
        let crew = Crew::new(Arc::new(provider.clone()), ws, CrewSettings::default());
        let executor =
            ActionExecutor::new(workspace.clone(), Templates::embedded()).with_halt_rendering(false);
        Fixture {
            _dir: dir,
            workspace,
            provider,
            crew,
            executor,
        }
    }

    impl Fixture {
        async fn resolve(&mut self, option: HumanOption, note: Option<&str>) -> Result<Resolution, ResolveError> {
            resolve(&self.workspace, option, note, &self.executor, &mut self.crew).await
        }
    }

    #[tokio::test]
    async fn test_resolution_requires_failed_phase() {
        let mut fx = failed_workspace();
        fs::remove_dir_all(fx.workspace.logs_dir()).unwrap();
        let err = fx.resolve(HumanOption::FixImplementation, None).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFailed { phase: Phase::Audit }));
        assert!(!fx.workspace.feedback_file().exists());
    }

    #[tokio::test]
    async fn test_fix_implementation_archives_code_and_audits() {
        let mut fx = failed_workspace();
        let resolution = fx
            .resolve(HumanOption::FixImplementation, Some("Drop the inline script."))
            .await
            .unwrap();
        assert_eq!(resolution.next_phase, Phase::Implementation);
        assert!(!fx.workspace.code_dir().exists());

        let archive = resolution.archived.unwrap();
        assert!(archive.join("code/layouts/index.html").is_file());
        assert!(archive.join("logs/audit_20250101_000100.md").is_file());

        let feedback = fs::read_to_string(fx.workspace.feedback_file()).unwrap();
        assert!(feedback.contains("Drop the inline script."));
        assert!(feedback.contains("> index.html ships JavaScript."));
    }

    #[tokio::test]
    async fn test_revise_architecture_rewrites_docs_then_archives() {
        let mut fx = failed_workspace();
        fx.provider
            .push(Role::Docs, Scripted::Reply(AgentReply::text("# Architecture v2")));
        fx.provider
            .push(Role::Docs, Scripted::Reply(AgentReply::text("# Constraints v2")));
        let resolution = fx
            .resolve(HumanOption::ReviseArchitecture, None)
            .await
            .unwrap();
        assert_eq!(resolution.next_phase, Phase::Implementation);
        assert_eq!(resolution.written.len(), 2);
        assert_eq!(
            fs::read_to_string(fx.workspace.architecture_doc()).unwrap(),
            "# Architecture v2"
        );
        assert!(resolution.archived.is_some());

        let journal = fx.provider.journal();
        let (_, prompt) = journal.prompts.first().unwrap();
        assert!(prompt.contains("index.html ships JavaScript."));
        assert!(prompt.contains("Revise the docs from the audit findings"));
    }

    #[tokio::test]
    async fn test_failed_revision_archives_nothing() {
        let mut fx = failed_workspace();
        fx.provider
            .push(Role::Docs, Scripted::Fail("docs agent offline".into()));
        let err = fx
            .resolve(HumanOption::ReviseArchitecture, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::RevisionFailed(ref e) if e.contains("docs agent offline")));
        assert!(fx.workspace.code_dir().join("layouts/index.html").is_file());
        assert!(!fx.workspace.archive_dir().exists());
        assert!(!fx.workspace.feedback_file().exists());
    }

    #[tokio::test]
    async fn test_failed_revision_keeps_earlier_feedback() {
        let mut fx = failed_workspace();
        fs::write(fx.workspace.feedback_file(), "Use a dark theme.\n").unwrap();
        fx.provider
            .push(Role::Docs, Scripted::Fail("docs agent offline".into()));
        fx.resolve(HumanOption::ReviseArchitecture, Some("Drop the JavaScript"))
            .await
            .unwrap_err();
        assert_eq!(
            fs::read_to_string(fx.workspace.feedback_file()).unwrap(),
            "Use a dark theme.\n"
        );
        let journal = fx.provider.journal();
        let (_, prompt) = journal.prompts.first().unwrap();
        assert!(prompt.contains("Drop the JavaScript"));
    }

    #[tokio::test]
    async fn test_accept_violations_completes_project() {
        let mut fx = failed_workspace();
        let resolution = fx
            .resolve(HumanOption::AcceptViolations, Some("FAIL is fine for a prototype"))
            .await
            .unwrap();
        assert_eq!(resolution.next_phase, Phase::Complete);
        assert!(resolution.archived.is_none());
        assert!(fx.workspace.code_dir().is_dir());
        let audit = fs::read_to_string(&resolution.written[0]).unwrap();
        assert!(audit.contains("audit_20250101_000100.md"));
        assert!(!audit.contains("prototype"));
    }
}
