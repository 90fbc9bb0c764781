//! Reads raw facts from a project workspace.
//!
//! Nothing is cached: every call goes back to the filesystem. A missing
//! subdirectory means "nothing produced yet", so every fact depending on it is
//! false (or unknown), never an error.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{
    AUDIT_LOG_PREFIX, CODE_DIR, CONVERSATION_DIR, IMPLEMENTATION_LOG_PREFIX, LOGS_DIR, Workspace,
};
use crate::markers;
use crate::transcript;

/// File extensions that count as implementation output under `code/`.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "mjs", "rs", "go", "java", "kt", "rb", "php", "cs", "c", "cpp",
    "h", "hpp", "swift", "html", "css", "scss", "vue", "svelte", "sh", "sql",
];

/// Raw facts about a workspace at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactFacts {
    pub has_requirements: bool,
    pub has_conversation: bool,
    pub has_architecture_doc: bool,
    pub has_constraints_doc: bool,
    pub has_code: bool,
    pub has_implementation_log: bool,
    pub has_audit_log: bool,
    /// The latest transcript's architect turns say `CONSENSUS` and its coder turns say `AGREED`.
    pub dialogue_consensus: bool,
    /// `None` when there is no audit log, or the latest one could not be read.
    pub audit_passed: Option<bool>,
    pub human_feedback: Option<String>,
    pub latest_conversation: Option<PathBuf>,
    pub latest_audit_log: Option<PathBuf>,
}

/// Filesystem reader for one workspace.
#[derive(Debug, Clone)]
pub struct ArtifactReader {
    workspace: Workspace,
}

impl ArtifactReader {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn read_facts(&self) -> ArtifactFacts {
        let ws = &self.workspace;
        let conversations = self.conversation_files();
        let audits = self.audit_logs();

        let latest_conversation = latest_by_mtime(&conversations);
        let latest_audit_log = latest_by_mtime(&audits);

        let dialogue_consensus = latest_conversation
            .as_deref()
            .and_then(read_text)
            .map(|text| transcript::rendered_consensus(&text))
            .unwrap_or(false);

        let audit_passed = latest_audit_log
            .as_deref()
            .and_then(read_text)
            .map(|text| markers::audit_passed(&text));

        let human_feedback = read_text(&ws.feedback_file())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        ArtifactFacts {
            has_requirements: ws.requirements().is_file(),
            has_conversation: !conversations.is_empty(),
            has_architecture_doc: ws.architecture_doc().is_file(),
            has_constraints_doc: ws.constraints_doc().is_file(),
            has_code: !self.code_files().is_empty(),
            has_implementation_log: !self.implementation_logs().is_empty(),
            has_audit_log: !audits.is_empty(),
            dialogue_consensus,
            audit_passed,
            human_feedback,
            latest_conversation,
            latest_audit_log,
        }
    }

    /// `conversation/*.md`
    pub fn conversation_files(&self) -> Vec<PathBuf> {
        glob_files(&self.workspace.path().join(CONVERSATION_DIR), "*.md")
    }

    pub fn latest_conversation(&self) -> Option<PathBuf> {
        latest_by_mtime(&self.conversation_files())
    }

    /// `logs/audit_*.md`
    pub fn audit_logs(&self) -> Vec<PathBuf> {
        glob_files(
            &self.workspace.path().join(LOGS_DIR),
            &format!("{}_*.md", AUDIT_LOG_PREFIX),
        )
    }

    pub fn latest_audit_log(&self) -> Option<PathBuf> {
        latest_by_mtime(&self.audit_logs())
    }

    /// `logs/implementation_*.md`
    pub fn implementation_logs(&self) -> Vec<PathBuf> {
        glob_files(
            &self.workspace.path().join(LOGS_DIR),
            &format!("{}_*.md", IMPLEMENTATION_LOG_PREFIX),
        )
    }

    /// Source files under `code/`, sorted.
    pub fn code_files(&self) -> Vec<PathBuf> {
        let root = self.workspace.path().join(CODE_DIR);
        if !root.is_dir() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_source_file(p))
            .collect();
        files.sort();
        files
    }
}

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Most recently modified file; equal times are broken by the larger path.
pub fn latest_by_mtime(paths: &[PathBuf]) -> Option<PathBuf> {
    paths
        .iter()
        .filter_map(|p| {
            let modified = fs::metadata(p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, p)| p.clone())
}

fn glob_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let mut files: Vec<PathBuf> = match glob::glob(&full) {
        Ok(paths) => paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect(),
        Err(e) => {
            tracing::warn!(pattern = %full, error = %e, "invalid artifact glob");
            Vec::new()
        }
    };
    files.sort();
    files
}

fn read_text(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read artifact");
            None
        }
    }
}
