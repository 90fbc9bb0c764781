//! The two fixed document templates used by synthesis.
//!
//! Built-in copies are embedded from `templates/` at compile time. A configured
//! override directory wins for any template file it contains.

use rust_embed::RustEmbed;
use std::path::{Path, PathBuf};

use crate::agents::prompts::DocKind;
use crate::errors::WorkspaceError;
use crate::workspace::read_artifact;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates/"]
struct Embedded;

pub const ARCHITECTURE_TEMPLATE: &str = "ARCHITECTURE_TEMPLATE.md";
pub const CONSTRAINTS_TEMPLATE: &str = "CONSTRAINTS_TEMPLATE.md";

pub fn template_name(kind: DocKind) -> &'static str {
    match kind {
        DocKind::Architecture => ARCHITECTURE_TEMPLATE,
        DocKind::Constraints => CONSTRAINTS_TEMPLATE,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Templates {
    override_dir: Option<PathBuf>,
}

impl Templates {
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    pub fn load(&self, kind: DocKind) -> Result<String, WorkspaceError> {
        let name = template_name(kind);
        if let Some(dir) = &self.override_dir {
            let candidate = dir.join(name);
            if candidate.is_file() {
                tracing::debug!(template = %candidate.display(), "using template override");
                return read_artifact(&candidate);
            }
        }
        Embedded::get(name)
            .map(|file| String::from_utf8_lossy(&file.data).into_owned())
            .ok_or_else(|| WorkspaceError::MissingArtifact {
                path: PathBuf::from(name),
            })
    }
}
