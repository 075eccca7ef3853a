//! Results storage and retrieval
//!
//! Persists run summaries as JSON files, one per run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::results::RunSummary;

/// Generate unique run ID
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    /// Create a new results storage
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create with default directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seismograph")
            .join("runs");
        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ids name a file directly inside `base_dir`
    fn run_path(&self, run_id: &str) -> Result<PathBuf> {
        let plain = !run_id.is_empty()
            && run_id != "."
            && run_id != ".."
            && !run_id.contains(['/', '\\'])
            && Path::new(run_id).components().count() == 1;
        if !plain {
            anyhow::bail!("Invalid run id: {run_id:?}");
        }
        Ok(self.base_dir.join(format!("{run_id}.json")))
    }

    /// Save a run summary
    pub fn save(&self, summary: &RunSummary) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create directory: {}", self.base_dir.display())
        })?;

        let path = self.run_path(&summary.run_id)?;
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, summary).context("Failed to write results")?;

        info!("Saved run results to {}", path.display());
        Ok(path)
    }

    /// Load a run summary by id
    pub fn load(&self, run_id: &str) -> Result<RunSummary> {
        let path = self.run_path(run_id)?;
        let summary = self
            .load_from_path(&path)
            .with_context(|| format!("No stored run with id {run_id}"))?;

        debug!("Loaded run results from {}", path.display());
        Ok(summary)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<RunSummary> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// All stored runs, newest first
    pub fn list_runs(&self) -> Result<Vec<RunInfo>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            match self.load_from_path(&path) {
                Ok(summary) => runs.push(RunInfo::from(&summary)),
                Err(e) => debug!("Failed to load {}: {}", path.display(), e),
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Most recent stored run
    pub fn latest(&self) -> Result<Option<RunSummary>> {
        match self.list_runs()?.first() {
            Some(info) => self.load(&info.id).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a run
    pub fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.run_path(run_id)?;
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted results: {}", path.display());
        }
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub pass_rate: f64,
    pub success: bool,
}

impl From<&RunSummary> for RunInfo {
    fn from(summary: &RunSummary) -> Self {
        Self {
            id: summary.run_id.clone(),
            strategy: summary.strategy.clone(),
            started_at: summary.started_at,
            total: summary.total,
            pass_rate: summary.pass_rate(),
            success: summary.was_success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultState;
    use chrono::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        let (stamp, suffix) = id.rsplit_once('_').unwrap();
        assert_eq!(stamp.len(), "20240101_120000".len());
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path().join("runs"));
        let summary = RunSummary::from_state("r1", "thread", Utc::now(), &ResultState::new());

        let path = storage.save(&summary).unwrap();
        assert!(path.exists());

        let loaded = storage.load("r1").unwrap();
        assert_eq!(loaded.strategy, "thread");
        assert!(storage.load("missing").is_err());
    }

    #[test]
    fn test_list_runs_newest_first() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let state = ResultState::new();

        let older = RunSummary::from_state("old", "sequential", Utc::now() - Duration::hours(1), &state);
        let newer = RunSummary::from_state("new", "process", Utc::now(), &state);
        storage.save(&older).unwrap();
        storage.save(&newer).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let runs = storage.list_runs().unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "old"]);
        assert_eq!(storage.latest().unwrap().unwrap().run_id, "new");

        storage.delete("new").unwrap();
        assert_eq!(storage.list_runs().unwrap().len(), 1);
    }

    #[test]
    fn test_ids_cannot_leave_base_dir() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path().join("runs"));
        let outside = RunSummary::from_state("x", "thread", Utc::now(), &ResultState::new());
        ResultsStorage::new(dir.path()).save(&outside).unwrap();

        for id in ["../x", "..", "", "a/b", "a\\b", "/tmp/x"] {
            assert!(storage.load(id).is_err(), "{id:?}");
            assert!(storage.delete(id).is_err(), "{id:?}");
        }
        assert!(dir.path().join("x.json").exists());
    }

    #[test]
    fn test_list_runs_without_directory() {
        let storage = ResultsStorage::new("/nonexistent/seismograph/runs");
        assert!(storage.list_runs().unwrap().is_empty());
    }
}
