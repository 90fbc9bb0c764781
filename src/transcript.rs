//! Dialogue transcripts as written to `conversation/dialogue_<ts>.md`.
//!
//! The header never contains a marker literal, and consensus is read back from the
//! `## <Role>` sections only, so it always matches the recorded `Consensus:` line.

use chrono::{DateTime, Local};
use std::fmt::Write as _;

use crate::agents::Role;
use crate::markers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub project: String,
    pub date: DateTime<Local>,
    pub turns: Vec<Turn>,
    pub consensus: bool,
    /// File name of the transcript this dialogue continued, if any.
    pub continues: Option<String>,
}

impl Transcript {
    pub fn new(project: &str, date: DateTime<Local>) -> Self {
        Self {
            project: project.to_string(),
            date,
            turns: Vec::new(),
            consensus: false,
            continues: None,
        }
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
        });
    }

    pub fn turns_of(&self, role: Role) -> Vec<&str> {
        self.turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.text.as_str())
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Architectural Dialogue\n\n");
        let _ = writeln!(out, "**Date:** {}", self.date.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "**Project:** {}", self.project);
        if let Some(previous) = &self.continues {
            let _ = writeln!(out, "**Continues:** {}", previous);
        }
        let _ = writeln!(out, "**Turns:** {}", self.turns.len());
        let _ = writeln!(
            out,
            "**Consensus:** {}\n",
            if self.consensus { "YES" } else { "NO" }
        );
        out.push_str("---\n\n");
        for turn in &self.turns {
            let _ = writeln!(out, "## {}\n", turn.role.title());
            let _ = writeln!(out, "{}\n", turn.text.trim_end());
            out.push_str("---\n\n");
        }
        out
    }
}

/// Turns recovered from a rendered transcript by their `## <Role>` headings.
///
/// Text before the first heading (the header block) belongs to no turn.
pub fn parse_turns(text: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    for line in text.lines() {
        if let Some(role) = line.strip_prefix("## ").and_then(role_for_title) {
            turns.push(Turn {
                role,
                text: String::new(),
            });
            continue;
        }
        if line.trim() == "---" {
            continue;
        }
        if let Some(turn) = turns.last_mut() {
            turn.text.push_str(line);
            turn.text.push('\n');
        }
    }
    for turn in &mut turns {
        turn.text = turn.text.trim().to_string();
    }
    turns
}

fn role_for_title(title: &str) -> Option<Role> {
    Role::ALL.into_iter().find(|r| r.title() == title.trim_end())
}

/// Consensus of a rendered transcript, judged per role like a live dialogue.
pub fn rendered_consensus(text: &str) -> bool {
    let turns = parse_turns(text);
    let of = |role: Role| -> Vec<&str> {
        turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.text.as_str())
            .collect()
    };
    markers::dialogue_consensus(&of(Role::Architect), &of(Role::Coder))
}
