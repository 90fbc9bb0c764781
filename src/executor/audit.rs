use anyhow::{Context, Result, bail};
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::Completed;
use crate::agents::{Crew, prompts};
use crate::markers;
use crate::workspace::{Workspace, read_artifact, write_artifact};

/// Directories never shown to the auditor.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", "target", "__pycache__", ".venv"];
const MAX_FILE_CHARS: usize = 20_000;
const MAX_TOTAL_CHARS: usize = 200_000;

/// Text files under a code directory, bounded for inclusion in a prompt.
#[derive(Debug, Default)]
pub struct CodeTree {
    files: Vec<(PathBuf, String)>,
    omitted: usize,
}

impl CodeTree {
    /// Walk `code_dir` in path order. Binary files are skipped, long files are cut,
    /// and files past the total budget are counted but not included.
    pub fn collect(code_dir: &Path) -> Self {
        let mut tree = CodeTree::default();
        let mut total = 0;
        let walker = WalkDir::new(code_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
            });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(mut text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            if total >= MAX_TOTAL_CHARS {
                tree.omitted += 1;
                continue;
            }
            if text.chars().count() > MAX_FILE_CHARS {
                text = text.chars().take(MAX_FILE_CHARS).collect();
                text.push_str("\n... (truncated)");
            }
            total += text.len();
            let relative = entry
                .path()
                .strip_prefix(code_dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            tree.files.push((relative, text));
        }
        tree
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, text) in &self.files {
            let _ = writeln!(out, "=== {} ===\n{}\n", path.display(), text.trim_end());
        }
        if self.omitted > 0 {
            let _ = writeln!(out, "({} more files omitted)", self.omitted);
        }
        out
    }
}

pub(super) async fn run(
    workspace: &Workspace,
    crew: &mut Crew,
    constraints_doc: &Path,
    code_dir: &Path,
) -> Result<Completed> {
    let constraints = read_artifact(constraints_doc)?;
    let tree = CodeTree::collect(code_dir);
    if tree.is_empty() {
        bail!("nothing to audit under {}", code_dir.display());
    }

    let report = crew
        .audit(&prompts::audit(&constraints, &tree.render()))
        .await
        .context("audit run")?;
    if !report.contains(markers::PASS) && !report.contains(markers::FAIL) {
        bail!("audit response carried no verdict");
    }
    let passed = markers::audit_passed(&report);

    let now = Local::now();
    let path = workspace.new_audit_log_path(now);
    // The header avoids the project name so it can never add a verdict marker.
    let mut out = String::from("# Audit Report\n\n");
    let _ = writeln!(out, "**Date:** {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "**Constraints:** {}",
        constraints_doc
            .strip_prefix(workspace.path())
            .unwrap_or(constraints_doc)
            .display()
    );
    let _ = writeln!(out, "**Files reviewed:** {}\n", tree.file_count());
    out.push_str("---\n\n");
    out.push_str(report.trim());
    out.push('\n');
    write_artifact(&path, &out)?;
    tracing::info!(audit = %path.display(), passed, files = tree.file_count(), "audit recorded");

    Ok(Completed {
        artifacts: vec![path],
        summary: if passed {
            "constraints satisfied".to_string()
        } else {
            "constraint violations found".to_string()
        },
    })
}
