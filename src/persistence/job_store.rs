use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::backtest::job::JobRecord;
use crate::error::Result;

/// Repository for backtest job records. Records serialize as JSON with
/// ISO-8601 timestamps and the status enum as a string.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn save_job(&self, record: &JobRecord) -> Result<()>;

    async fn load_job(&self, id: &str) -> Result<Option<JobRecord>>;

    /// Most recently submitted first.
    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>>;

    async fn delete_job(&self, id: &str) -> Result<bool>;
}

/// In-memory job store for tests.
pub struct MemoryJobStore {
    jobs: DashMap<String, JobRecord>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MemoryJobStore {
    async fn save_job(&self, record: &JobRecord) -> Result<()> {
        self.jobs.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_job(&self, id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let mut records: Vec<JobRecord> =
            self.jobs.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        Ok(self.jobs.remove(id).is_some())
    }
}

/// File-backed job store: one `<id>.json` document per job in a directory.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn job_path(&self, id: &str) -> PathBuf {
        // Ids are UUIDs; strip anything that could escape the directory.
        let safe: String = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl JobRepository for FileJobStore {
    async fn save_job(&self, record: &JobRecord) -> Result<()> {
        let payload = serde_json::to_vec_pretty(record)?;
        let path = self.job_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn load_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let path = self.job_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(crate::error::PivotError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    // One corrupt file must not hide the rest.
                    warn!(path = %path.display(), error = %e, "skipping unreadable job file");
                }
            }
        }
        records.sort_by(|a: &JobRecord, b: &JobRecord| b.submitted_at.cmp(&a.submitted_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        let path = self.job_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }
}
