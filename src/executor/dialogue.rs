use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::Path;

use super::Completed;
use crate::agents::{Crew, Role, prompts};
use crate::markers;
use crate::transcript::Transcript;
use crate::workspace::{Workspace, read_artifact, write_artifact};

/// Four sequential turns: architect proposes, coder evaluates, architect responds,
/// coder gives a final evaluation. The transcript is only written once every turn
/// has succeeded.
pub(super) async fn run(
    workspace: &Workspace,
    crew: &mut Crew,
    requirements: &Path,
    resume_from: Option<&Path>,
    now: DateTime<Local>,
) -> Result<Completed> {
    let requirements_text = read_artifact(requirements)?;
    let previous = match resume_from {
        Some(path) => match read_artifact(path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "previous transcript unreadable, starting fresh");
                None
            }
        },
        None => None,
    };

    let proposal = crew
        .propose(&prompts::architect_opening(&requirements_text, previous.as_deref()))
        .await
        .context("architect proposal")?;
    let evaluation = crew
        .evaluate(&prompts::coder_evaluation(&proposal))
        .await
        .context("coder evaluation")?;
    let response = crew
        .propose(&prompts::architect_response(&evaluation))
        .await
        .context("architect response")?;
    let verdict = crew
        .evaluate(&prompts::coder_final(&response))
        .await
        .context("coder final evaluation")?;

    let mut transcript = Transcript::new(workspace.project_name(), now);
    transcript.continues = resume_from
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    transcript.push(Role::Architect, proposal);
    transcript.push(Role::Coder, evaluation);
    transcript.push(Role::Architect, response);
    transcript.push(Role::Coder, verdict);
    transcript.consensus = markers::dialogue_consensus(
        &transcript.turns_of(Role::Architect),
        &transcript.turns_of(Role::Coder),
    );

    let path = workspace.new_transcript_path(now);
    write_artifact(&path, &transcript.render())?;
    tracing::info!(
        transcript = %path.display(),
        consensus = transcript.consensus,
        "dialogue saved"
    );

    Ok(Completed {
        artifacts: vec![path],
        summary: format!(
            "{} turns, consensus {}",
            transcript.turns.len(),
            if transcript.consensus { "yes" } else { "no" }
        ),
    })
}
