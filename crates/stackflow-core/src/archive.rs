//! Run report archive and run lock
//!
//! Reports are written to `.stackflow/runs/<run-id>.json`. Run ids are UTC
//! timestamps, so file names sort chronologically. `.stackflow/lock.json`
//! keeps two applies from running against the same project at once.

use crate::error::{CoreError, Result};
use crate::report::RunReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_DIR: &str = ".stackflow";
const RUNS_DIR: &str = "runs";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Reads and writes archived run reports
pub struct ReportArchive {
    /// Project root directory
    project_root: PathBuf,
}

impl ReportArchive {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn runs_dir(&self) -> PathBuf {
        self.state_dir().join(RUNS_DIR)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    fn report_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    /// Write a report and return where it went
    pub async fn save(&self, report: &RunReport) -> Result<PathBuf> {
        let dir = self.runs_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!(dir = %dir.display(), "Created runs directory");
        }

        let path = self.report_path(&report.run_id);
        let content = serde_json::to_string_pretty(report)?;
        fs::write(&path, content).await?;

        tracing::debug!(run_id = %report.run_id, path = %path.display(), "Archived run report");
        Ok(path)
    }

    /// Archived run ids, oldest first
    pub async fn list(&self) -> Result<Vec<String>> {
        let dir = self.runs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn load(&self, run_id: &str) -> Result<RunReport> {
        let path = self.report_path(run_id);
        if !path.exists() {
            return Err(CoreError::ArchiveError(format!("run '{run_id}' not found")));
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Most recent report, if any run was archived
    pub async fn latest(&self) -> Result<Option<RunReport>> {
        match self.list().await?.last() {
            Some(run_id) => Ok(Some(self.load(run_id).await?)),
            None => Ok(None),
        }
    }

    /// Acquire the project run lock
    pub async fn acquire_lock(&self) -> Result<RunLock> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < STALE_LOCK_HOURS {
                return Err(CoreError::LockError(format!(
                    "another run by {} (pid {}) holds the lock since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            tracing::warn!(holder = %lock_info.holder, "Removing stale run lock");
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!(path = %lock_path.display(), "Acquired run lock");
        Ok(RunLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the run lock
pub struct RunLock {
    lock_path: PathBuf,
    released: bool,
}

impl RunLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released run lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceGraph;
    use crate::plan::{Direction, OperationPlan};
    use chrono::Duration;
    use tempfile::tempdir;

    fn report_at(started_at: DateTime<Utc>) -> RunReport {
        let plan = OperationPlan {
            deployment: "web".to_string(),
            direction: Direction::Delete,
            steps: Vec::new(),
        };
        RunReport::summarize(
            &ResourceGraph::new("web"),
            &plan,
            Vec::new(),
            started_at,
            false,
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_save_and_latest() {
        let temp_dir = tempdir().unwrap();
        let archive = ReportArchive::new(temp_dir.path());

        let older = report_at(Utc::now() - Duration::minutes(5));
        let newer = report_at(Utc::now());
        archive.save(&newer).await.unwrap();
        archive.save(&older).await.unwrap();

        let ids = archive.list().await.unwrap();
        assert_eq!(ids, vec![older.run_id.clone(), newer.run_id.clone()]);

        let latest = archive.latest().await.unwrap().unwrap();
        assert_eq!(latest.run_id, newer.run_id);
    }

    #[tokio::test]
    async fn test_empty_archive() {
        let temp_dir = tempdir().unwrap();
        let archive = ReportArchive::new(temp_dir.path());
        assert!(archive.latest().await.unwrap().is_none());
        assert!(matches!(
            archive.load("20240101T000000.000Z").await,
            Err(CoreError::ArchiveError(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let archive = ReportArchive::new(temp_dir.path());

        let lock = archive.acquire_lock().await.unwrap();
        assert!(matches!(
            archive.acquire_lock().await,
            Err(CoreError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = archive.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(STATE_DIR).join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let archive = ReportArchive::new(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join(STATE_DIR)).unwrap();

        let stale = LockInfo {
            holder: "old-host".to_string(),
            pid: 1,
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join(STATE_DIR).join(LOCK_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(archive.acquire_lock().await.is_ok());
    }
}
