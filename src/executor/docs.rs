use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use super::Completed;
use crate::agents::Crew;
use crate::agents::prompts::{self, DocKind};
use crate::templates::Templates;
use crate::workspace::{read_artifact, write_artifact};

/// Generate both documents from the latest transcript, then write both.
/// Nothing is written unless both calls succeed.
pub(super) async fn synthesize(
    crew: &mut Crew,
    templates: &Templates,
    transcript: &Path,
    architecture_doc: &Path,
    constraints_doc: &Path,
    feedback: Option<&str>,
) -> Result<Completed> {
    if transcript.as_os_str().is_empty() {
        bail!("no conversation transcript to synthesize from");
    }
    let conversation = read_artifact(transcript)?;

    let mut generated = Vec::with_capacity(2);
    for (kind, target) in DocKind::BOTH.into_iter().zip([architecture_doc, constraints_doc]) {
        let template = templates.load(kind)?;
        let text = crew
            .synthesize(&prompts::synthesis(kind, &conversation, &template, feedback))
            .await
            .with_context(|| format!("synthesizing {}", kind.file_name()))?;
        generated.push((target.to_path_buf(), text));
    }
    write_all(generated, "synthesized from the latest transcript")
}

/// Revise both documents from their current text, the latest audit report and
/// operator feedback.
pub(super) async fn revise(
    crew: &mut Crew,
    architecture_doc: &Path,
    constraints_doc: &Path,
    audit_log: Option<&Path>,
    feedback: Option<&str>,
) -> Result<Completed> {
    let audit = audit_log.map(read_artifact).transpose()?;

    let mut generated = Vec::with_capacity(2);
    for (kind, target) in DocKind::BOTH.into_iter().zip([architecture_doc, constraints_doc]) {
        let current = read_artifact(target)?;
        let text = crew
            .synthesize(&prompts::revision(kind, &current, audit.as_deref(), feedback))
            .await
            .with_context(|| format!("revising {}", kind.file_name()))?;
        generated.push((target.to_path_buf(), text));
    }
    write_all(generated, "revised from the audit report")
}

fn write_all(generated: Vec<(PathBuf, String)>, how: &str) -> Result<Completed> {
    let mut artifacts = Vec::with_capacity(generated.len());
    for (path, text) in generated {
        write_artifact(&path, &text)?;
        tracing::info!(doc = %path.display(), chars = text.len(), "document written");
        artifacts.push(path);
    }
    Ok(Completed {
        summary: format!("{} documents {}", artifacts.len(), how),
        artifacts,
    })
}
