//! Persisted JSON record of one orchestration run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{HistoryEntry, LoopSettings, RunOutcome};
use crate::state::Phase;

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub settings: LoopSettings,
    pub history: Vec<HistoryEntry>,
    pub final_phase: Option<Phase>,
    pub outcome: Option<RunOutcome>,
}

/// Writes `logs/orchestration_<ts>.json`, rewritten after every entry so an
/// interrupted run still leaves a record.
pub struct RunLog {
    path: PathBuf,
    record: RunRecord,
}

impl RunLog {
    pub fn start(path: &Path, project: &str, settings: LoopSettings) -> Result<Self> {
        let log = Self {
            path: path.to_path_buf(),
            record: RunRecord {
                run_id: Uuid::new_v4(),
                project: project.to_string(),
                started_at: Utc::now(),
                ended_at: None,
                settings,
                history: Vec::new(),
                final_phase: None,
                outcome: None,
            },
        };
        log.save()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.record.run_id
    }

    pub fn record(&mut self, entry: HistoryEntry) -> Result<()> {
        self.record.history.push(entry);
        self.save()
    }

    pub fn finish(mut self, outcome: RunOutcome, final_phase: Phase) -> Result<PathBuf> {
        self.record.ended_at = Some(Utc::now());
        self.record.outcome = Some(outcome);
        self.record.final_phase = Some(final_phase);
        self.save()?;
        Ok(self.path)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(&self.record).context("Failed to serialize run record")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write run record {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ActionType;
    use crate::executor::ActionOutcome;
    use chrono::Local;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn entry() -> HistoryEntry {
        HistoryEntry {
            iteration: 1,
            phase: Phase::Audit,
            action: ActionType::RunAudit,
            reason: "code present".into(),
            inputs: BTreeMap::new(),
            outcome: ActionOutcome::Failed {
                error: "auditor timed out".into(),
            },
            started_at: Local::now(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_record_is_rewritten_after_each_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/orchestration_20250101_000000.json");
        let mut log = RunLog::start(&path, "demo", LoopSettings::default()).unwrap();
        let before: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(before["history"].as_array().unwrap().len(), 0);
        assert!(before["outcome"].is_null());

        log.record(entry()).unwrap();
        let written = log
            .finish(
                RunOutcome::IterationBudgetExhausted { max_iterations: 1 },
                Phase::Audit,
            )
            .unwrap();

        let after: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(after["project"], "demo");
        assert_eq!(after["history"][0]["action"], "run_audit");
        assert_eq!(after["history"][0]["outcome"]["status"], "failed");
        assert_eq!(after["outcome"]["outcome"], "iteration_budget_exhausted");
        assert_eq!(after["final_phase"], "audit");
        assert!(after["ended_at"].is_string());
    }
}
