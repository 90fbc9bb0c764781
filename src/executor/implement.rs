use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use super::Completed;
use crate::agents::{Crew, ToolUse, prompts};
use crate::scope::PermissionDecision;
use crate::ui::OrchestratorUI;
use crate::workspace::{
    ORCHESTRATION_LOG_PREFIX, Workspace, is_source_file, read_artifact, write_artifact,
};

/// A tool call the write scope blocked.
#[derive(Debug)]
struct Denial {
    tool: String,
    target: Option<String>,
    message: String,
}

pub(super) async fn run(
    workspace: &Workspace,
    crew: &mut Crew,
    architecture_doc: &Path,
    constraints_doc: &Path,
    code_dir: &Path,
    feedback: Option<&str>,
    ui: Option<&OrchestratorUI>,
) -> Result<Completed> {
    let architecture = read_artifact(architecture_doc)?;
    let constraints = read_artifact(constraints_doc)?;
    fs::create_dir_all(code_dir)
        .with_context(|| format!("Failed to create {}", code_dir.display()))?;

    let before = snapshot(code_dir);
    let outside = OutsideCode::capture(workspace);
    let prompt = prompts::implementation(
        &architecture,
        &constraints,
        &code_dir.display().to_string(),
        feedback,
    );
    let outcome = crew.implement(&prompt).await;
    let reverted = outside.restore(workspace)?;
    for path in &reverted {
        let shown = path.strip_prefix(workspace.path()).unwrap_or(path);
        tracing::warn!(path = %shown.display(), "reverted write outside the code directory");
        if let Some(ui) = ui {
            ui.show_denied(&shown.display().to_string(), "reverted: outside the code directory");
        }
    }
    let reply = outcome.context("implementation run")?;
    if !reverted.is_empty() {
        let shown: Vec<String> = reverted
            .iter()
            .map(|p| p.strip_prefix(workspace.path()).unwrap_or(p).display().to_string())
            .collect();
        bail!(
            "implementation wrote outside {}; reverted {}",
            code_dir.display(),
            shown.join(", ")
        );
    }
    let after = snapshot(code_dir);

    let denials = check_tool_uses(crew, &reply.tool_uses);
    if let Some(ui) = ui {
        for denial in &denials {
            ui.show_denied(denial.target.as_deref().unwrap_or(&denial.tool), &denial.message);
        }
    }
    for denial in &denials {
        tracing::warn!(
            tool = %denial.tool,
            target = denial.target.as_deref().unwrap_or("-"),
            reason = %denial.message,
            "collaborator tool call blocked"
        );
    }

    if !after.keys().any(|p| is_source_file(p)) {
        bail!(
            "implementation produced no source files under {}",
            code_dir.display()
        );
    }

    let written: Vec<PathBuf> = after
        .iter()
        .filter(|(path, mtime)| before.get(*path) != Some(*mtime))
        .map(|(path, _)| path.clone())
        .collect();

    let now = Local::now();
    let log_path = workspace.new_implementation_log_path(now);
    write_artifact(
        &log_path,
        &render_log(workspace, now, &written, &denials, &reply.text),
    )?;
    tracing::info!(
        log = %log_path.display(),
        written = written.len(),
        blocked = denials.len(),
        "implementation recorded"
    );

    let summary = format!("{} files written, {} blocked", written.len(), denials.len());
    let mut artifacts = Vec::with_capacity(written.len() + 1);
    artifacts.push(log_path);
    artifacts.extend(written);
    Ok(Completed { artifacts, summary })
}

/// Every workspace file outside `code/`, kept so stray writes can be undone.
///
/// The lock file and orchestration logs are excluded; the running process
/// writes those itself.
struct OutsideCode {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl OutsideCode {
    fn capture(workspace: &Workspace) -> Self {
        let mut files = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        for entry in outside_entries(workspace) {
            if entry.file_type().is_dir() {
                dirs.insert(entry.into_path());
            } else if entry.file_type().is_file()
                && let Ok(contents) = fs::read(entry.path())
            {
                files.insert(entry.into_path(), contents);
            }
        }
        Self { files, dirs }
    }

    /// Delete what is new, rewrite what changed or vanished. Returns the paths touched.
    fn restore(&self, workspace: &Workspace) -> Result<Vec<PathBuf>> {
        let mut reverted = Vec::new();
        let mut seen = BTreeSet::new();
        let mut new_dirs = Vec::new();

        for entry in outside_entries(workspace) {
            let path = entry.path();
            if entry.file_type().is_dir() {
                if !self.dirs.contains(path) {
                    new_dirs.push(path.to_path_buf());
                }
                continue;
            }
            match self.files.get(path) {
                Some(original) => {
                    seen.insert(path.to_path_buf());
                    if fs::read(path).ok().as_deref() != Some(original.as_slice()) {
                        fs::write(path, original)
                            .with_context(|| format!("Failed to restore {}", path.display()))?;
                        reverted.push(path.to_path_buf());
                    }
                }
                None => {
                    fs::remove_file(path)
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                    reverted.push(path.to_path_buf());
                }
            }
        }

        // Deepest first, so parents are empty by the time they are reached.
        new_dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in new_dirs {
            if fs::remove_dir(&dir).is_ok() {
                reverted.push(dir);
            }
        }

        for (path, original) in self.files.iter().filter(|(p, _)| !seen.contains(*p)) {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, original)
                .with_context(|| format!("Failed to restore {}", path.display()))?;
            reverted.push(path.clone());
        }

        reverted.sort();
        Ok(reverted)
    }
}

fn outside_entries(workspace: &Workspace) -> impl Iterator<Item = DirEntry> {
    let code_dir = workspace.code_dir();
    let lock_file = workspace.lock_file();
    let logs_dir = workspace.logs_dir();
    WalkDir::new(workspace.path())
        .min_depth(1)
        .into_iter()
        .filter_entry(move |e| e.path() != code_dir)
        .filter_map(|e| e.ok())
        .filter(move |e| {
            let own_log = e.path().parent() == Some(logs_dir.as_path())
                && e.file_name()
                    .to_string_lossy()
                    .starts_with(ORCHESTRATION_LOG_PREFIX);
            e.path() != lock_file && !own_log
        })
}

/// Modification time of every file under `dir`.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<SystemTime>> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let modified = e.metadata().ok().and_then(|m| m.modified().ok());
            (e.into_path(), modified)
        })
        .collect()
}

fn check_tool_uses(crew: &Crew, tool_uses: &[ToolUse]) -> Vec<Denial> {
    tool_uses
        .iter()
        .filter_map(|tool_use| match crew.scope().check_tool(&tool_use.name, &tool_use.input) {
            PermissionDecision::Allow => None,
            PermissionDecision::Deny { message } => Some(Denial {
                tool: tool_use.name.clone(),
                target: target_of(&tool_use.input),
                message,
            }),
        })
        .collect()
}

fn target_of(input: &Value) -> Option<String> {
    ["file_path", "notebook_path", "path", "command"]
        .iter()
        .find_map(|key| input.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn render_log(
    workspace: &Workspace,
    at: DateTime<Local>,
    written: &[PathBuf],
    denials: &[Denial],
    reply: &str,
) -> String {
    let mut out = String::from("# Implementation Log\n\n");
    let _ = writeln!(out, "**Date:** {}", at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "**Project:** {}\n", workspace.project_name());

    let _ = writeln!(out, "## Files written ({})\n", written.len());
    if written.is_empty() {
        out.push_str("_none_\n");
    }
    for path in written {
        let shown = path.strip_prefix(workspace.path()).unwrap_or(path);
        let _ = writeln!(out, "- {}", shown.display());
    }

    let _ = writeln!(out, "\n## Blocked tool calls ({})\n", denials.len());
    if denials.is_empty() {
        out.push_str("_none_\n");
    }
    for denial in denials {
        match &denial.target {
            Some(target) => {
                let _ = writeln!(out, "- {} `{}`: {}", denial.tool, target, denial.message);
            }
            None => {
                let _ = writeln!(out, "- {}: {}", denial.tool, denial.message);
            }
        }
    }

    out.push_str("\n## Implementer summary\n\n");
    out.push_str(reply.trim());
    out.push('\n');
    out
}
