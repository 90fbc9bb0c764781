//! Per-project workspace layout.
//!
//! Every durable artifact of a project lives under `<root>/<project>/`:
//!
//! ```text
//! <root>/<project>/
//! ├── requirements.md              # written once by the caller
//! ├── feedback.md                  # optional operator feedback
//! ├── conversation/
//! │   └── dialogue_<ts>.md         # one per dialogue run, never overwritten
//! ├── architecture/
//! │   ├── ARCHITECTURE.md          # overwritten by each synthesis
//! │   └── CONSTRAINTS.md
//! ├── code/                        # implementation output, the only writable subtree
//! ├── logs/
//! │   ├── implementation_<ts>.md
//! │   ├── audit_<ts>.md
//! │   └── orchestration_<ts>.{log,json}
//! └── archive/<ts>/                # artifacts set aside by operator resolution
//! ```
//!
//! The root is always passed in explicitly, so two runs in one process can target
//! different roots.

pub mod reader;

pub use reader::{ArtifactFacts, ArtifactReader, is_source_file};

use chrono::{DateTime, Local};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::WorkspaceError;

pub const REQUIREMENTS_FILE: &str = "requirements.md";
pub const FEEDBACK_FILE: &str = "feedback.md";
pub const CONVERSATION_DIR: &str = "conversation";
pub const ARCHITECTURE_DIR: &str = "architecture";
pub const ARCHITECTURE_DOC: &str = "ARCHITECTURE.md";
pub const CONSTRAINTS_DOC: &str = "CONSTRAINTS.md";
pub const CODE_DIR: &str = "code";
pub const LOGS_DIR: &str = "logs";
pub const ARCHIVE_DIR: &str = "archive";
pub const LOCK_FILE: &str = ".conductor.lock";

/// Timestamp format embedded in artifact file names (`dialogue_20250101_120000.md`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefixes of timestamped artifacts.
pub const DIALOGUE_PREFIX: &str = "dialogue";
pub const IMPLEMENTATION_LOG_PREFIX: &str = "implementation";
pub const AUDIT_LOG_PREFIX: &str = "audit";
pub const ORCHESTRATION_LOG_PREFIX: &str = "orchestration";

/// A project's workspace directory under an explicit root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    project: String,
    path: PathBuf,
}

/// Result of `Workspace::init`.
#[derive(Debug)]
pub struct InitResult {
    pub requirements: PathBuf,
    /// False when the workspace directory already existed.
    pub created: bool,
    /// True when an existing requirements file was replaced.
    pub overwritten: bool,
}

impl Workspace {
    /// Bind a project name to a root. The directory is not created.
    pub fn new(root: &Path, project: &str) -> Result<Self, WorkspaceError> {
        validate_project_name(project)?;
        Ok(Self {
            root: root.to_path_buf(),
            project: project.to_string(),
            path: root.join(project),
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn requirements(&self) -> PathBuf {
        self.path.join(REQUIREMENTS_FILE)
    }

    pub fn feedback_file(&self) -> PathBuf {
        self.path.join(FEEDBACK_FILE)
    }

    pub fn conversation_dir(&self) -> PathBuf {
        self.path.join(CONVERSATION_DIR)
    }

    pub fn architecture_dir(&self) -> PathBuf {
        self.path.join(ARCHITECTURE_DIR)
    }

    pub fn architecture_doc(&self) -> PathBuf {
        self.architecture_dir().join(ARCHITECTURE_DOC)
    }

    pub fn constraints_doc(&self) -> PathBuf {
        self.architecture_dir().join(CONSTRAINTS_DOC)
    }

    pub fn code_dir(&self) -> PathBuf {
        self.path.join(CODE_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.path.join(LOGS_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.path.join(ARCHIVE_DIR)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.path.join(LOCK_FILE)
    }

    /// Path for a new dialogue transcript. Never names an existing file.
    pub fn new_transcript_path(&self, at: DateTime<Local>) -> PathBuf {
        unique_timestamped_path(&self.conversation_dir(), DIALOGUE_PREFIX, "md", at)
    }

    pub fn new_implementation_log_path(&self, at: DateTime<Local>) -> PathBuf {
        unique_timestamped_path(&self.logs_dir(), IMPLEMENTATION_LOG_PREFIX, "md", at)
    }

    pub fn new_audit_log_path(&self, at: DateTime<Local>) -> PathBuf {
        unique_timestamped_path(&self.logs_dir(), AUDIT_LOG_PREFIX, "md", at)
    }

    /// Orchestration log and run record share a stem: `orchestration_<ts>`.
    pub fn orchestration_stem(&self, at: DateTime<Local>) -> String {
        format!("{}_{}", ORCHESTRATION_LOG_PREFIX, at.format(TIMESTAMP_FORMAT))
    }

    /// Create the workspace and write `requirements.md`.
    ///
    /// An existing requirements file is only replaced when `overwrite` is set.
    pub fn init(&self, requirements: &str, overwrite: bool) -> Result<InitResult, WorkspaceError> {
        let created = !self.exists();
        fs::create_dir_all(&self.path).map_err(|e| WorkspaceError::io(&self.path, e))?;

        let req = self.requirements();
        let existed = req.exists();
        if existed && !overwrite {
            return Ok(InitResult {
                requirements: req,
                created,
                overwritten: false,
            });
        }
        write_artifact(&req, requirements)?;
        Ok(InitResult {
            requirements: req,
            created,
            overwritten: existed,
        })
    }

    /// Replace the operator feedback file.
    pub fn write_feedback(&self, text: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.feedback_file();
        write_artifact(&path, text)?;
        Ok(path)
    }

    /// Move artifacts into `archive/<ts>/`, keeping their path relative to the workspace.
    ///
    /// Paths that do not exist are skipped. Returns the archive directory.
    pub fn archive(&self, paths: &[PathBuf], at: DateTime<Local>) -> Result<PathBuf, WorkspaceError> {
        let dest_root = unique_dir(&self.archive_dir(), &at.format(TIMESTAMP_FORMAT).to_string());
        for src in paths.iter().filter(|p| p.exists()) {
            let relative = src.strip_prefix(&self.path).unwrap_or(src.as_path());
            let dest = dest_root.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
            }
            fs::rename(src, &dest).map_err(|e| WorkspaceError::io(src, e))?;
            tracing::info!(from = %src.display(), to = %dest.display(), "archived artifact");
        }
        Ok(dest_root)
    }
}

/// Project names double as directory names, so they must be a single plain path segment.
pub fn validate_project_name(name: &str) -> Result<(), WorkspaceError> {
    let invalid = |reason: &str| WorkspaceError::InvalidProjectName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name must not start with '.'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character '{}' is not allowed", c)));
    }
    Ok(())
}

/// List project directories under a root, sorted by name.
pub fn list_projects(root: &Path) -> Result<Vec<String>, WorkspaceError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(root)
        .map_err(|e| WorkspaceError::io(root, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| validate_project_name(name).is_ok())
        .collect();
    names.sort();
    Ok(names)
}

/// Write a whole file, creating parent directories.
pub fn write_artifact(path: &Path, contents: &str) -> Result<(), WorkspaceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| WorkspaceError::io(path, e))
}

/// Read a whole artifact, mapping a missing file to `MissingArtifact`.
pub fn read_artifact(path: &Path) -> Result<String, WorkspaceError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::MissingArtifact {
                path: path.to_path_buf(),
            }
        } else {
            WorkspaceError::io(path, e)
        }
    })
}

/// `<dir>/<prefix>_<ts>.<ext>`, or `<prefix>_<ts>_<n>.<ext>` if that name is taken.
fn unique_timestamped_path(dir: &Path, prefix: &str, ext: &str, at: DateTime<Local>) -> PathBuf {
    let stem = format!("{}_{}", prefix, at.format(TIMESTAMP_FORMAT));
    let first = dir.join(format!("{}.{}", stem, ext));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn unique_dir(parent: &Path, name: &str) -> PathBuf {
    let first = parent.join(name);
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| parent.join(format!("{}_{}", name, n)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Exclusive advisory lock on a workspace, held for the duration of a run.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: fs::File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Take the lock without blocking; fails with `WorkspaceError::Busy` if another
    /// process holds it.
    pub fn acquire(workspace: &Workspace) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(workspace.path()).map_err(|e| WorkspaceError::io(workspace.path(), e))?;
        let path = workspace.lock_file();
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| WorkspaceError::io(&path, e))?;
        file.try_lock_exclusive()
            .map_err(|_| WorkspaceError::Busy { lock: path.clone() })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release workspace lock");
        }
    }
}
