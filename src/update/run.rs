// ABOUTME: The persisted record of one update run.
// ABOUTME: Each phase change is checked, timestamped, and written atomically as JSON.

use super::{Phase, UpdateError};
use crate::types::{BundleId, ComponentName, ImageId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A component moving from one version to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub component: ComponentName,
    pub from: ImageId,
    pub to: ImageId,
}

/// One entry in a run's phase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRun {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: Phase,
    /// Safety bundle captured before anything was changed.
    pub bundle: Option<BundleId>,
    pub changes: Vec<VersionChange>,
    pub error: Option<String>,
    pub history: Vec<PhaseEntry>,
}

impl UpdateRun {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            id: RunId::at(started_at),
            started_at,
            finished_at: None,
            phase: Phase::Idle,
            bundle: None,
            changes: Vec::new(),
            error: None,
            history: vec![PhaseEntry {
                phase: Phase::Idle,
                at: started_at,
            }],
        }
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn advance(&mut self, next: Phase) -> Result<(), UpdateError> {
        if !self.phase.can_transition_to(next) {
            return Err(UpdateError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }

        let at = Utc::now();
        tracing::debug!(run = %self.id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        self.history.push(PhaseEntry { phase: next, at });
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
        Ok(())
    }

    /// Record `reason` and move to Failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), UpdateError> {
        self.error = Some(reason.into());
        self.advance(Phase::Failed)
    }

    /// One line describing how the run ended.
    pub fn summary(&self) -> String {
        let changes = || {
            self.changes
                .iter()
                .map(|c| c.component.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.phase {
            Phase::NoUpdate => "All components are up to date".to_string(),
            Phase::Committed => format!("Updated {}", changes()),
            Phase::RolledBack => format!(
                "Update rolled back: {}",
                self.error.as_deref().unwrap_or("verification failed")
            ),
            Phase::Failed => format!(
                "Update failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            phase => format!("Update in progress ({})", phase),
        }
    }
}

impl Default for UpdateRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory of run records, one `<run id>.json` each.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the record through a temp file in the same directory.
    pub fn save(&self, run: &UpdateRun) -> Result<(), UpdateError> {
        let path = self.dir.join(format!("{}.json", run.id));
        let persist_err = |source| UpdateError::Persist {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(persist_err)?;
        let json = serde_json::to_vec_pretty(run).map_err(|e| persist_err(std::io::Error::other(e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(persist_err)?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&path).map_err(|e| persist_err(e.error))?;
        Ok(())
    }

    /// The most recently started run. Unreadable records are skipped.
    pub fn latest(&self) -> Result<Option<UpdateRun>, UpdateError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(UpdateError::Persist {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut latest: Option<UpdateRun> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let run = match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_slice::<UpdateRun>(&c).map_err(|e| e.to_string()))
            {
                Ok(run) => run,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping run record");
                    continue;
                }
            };
            if latest.as_ref().is_none_or(|l| run.started_at > l.started_at) {
                latest = Some(run);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn illegal_transition_is_rejected() {
        let mut run = UpdateRun::new();
        let err = run.advance(Phase::Applying).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::IllegalTransition {
                from: Phase::Idle,
                to: Phase::Applying
            }
        ));
        assert_eq!(run.phase, Phase::Idle);
        assert_eq!(run.history.len(), 1);
    }

    #[test]
    fn terminal_phase_sets_finished_at() {
        let mut run = UpdateRun::new();
        run.advance(Phase::Checking).unwrap();
        assert!(run.finished_at.is_none());
        run.advance(Phase::NoUpdate).unwrap();
        assert!(run.finished_at.is_some());
        assert!(run.phase.is_terminal());
        assert_eq!(run.summary(), "All components are up to date");
    }

    #[test]
    fn fail_records_reason() {
        let mut run = UpdateRun::new();
        run.advance(Phase::Checking).unwrap();
        run.fail("cancelled").unwrap();
        assert_eq!(run.phase, Phase::Failed);
        assert_eq!(run.summary(), "Update failed: cancelled");
    }

    #[test]
    fn store_returns_latest_run() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        assert!(store.latest().unwrap().is_none());

        let mut older = UpdateRun::new();
        older.started_at -= chrono::Duration::hours(1);
        older.id = RunId::new("run-older");
        store.save(&older).unwrap();

        let mut newer = UpdateRun::new();
        newer.advance(Phase::Checking).unwrap();
        store.save(&newer).unwrap();
        std::fs::write(store.dir().join("garbage.json"), b"{").unwrap();

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.phase, Phase::Checking);
    }
}
