//! Job storage implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use benchops_core::JobId;

use super::types::Job;

/// Job store abstraction.
///
/// `save` is a full-record upsert; there are no partial updates.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job record.
    async fn save(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// The `limit` most recently created jobs, newest first.
    fn list(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Every stored job, newest first.
    fn all(&self) -> Result<Vec<Job>, JobStoreError> {
        self.list(usize::MAX)
    }
}

/// Job store error.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job store I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode job {0}: {1}")]
    Serialize(JobId, #[source] serde_json::Error),
}

fn newest_first<'a>(jobs: impl Iterator<Item = &'a Job>, limit: usize) -> Vec<Job> {
    let mut result: Vec<Job> = jobs.cloned().collect();
    result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    result.truncate(limit);
    result
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&job_id).cloned())
    }

    fn list(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(newest_first(jobs.values(), limit))
    }
}

/// Disk-backed store: one `<job-id>.json` file per job, mirrored in memory.
///
/// Reads are served from memory. Writes go to a temp file that is renamed over
/// the record, so a crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct FileJobStore {
    dir: PathBuf,
    jobs: RwLock<HashMap<JobId, Job>>,
}

const RECORD_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".json.tmp";

impl FileJobStore {
    /// Open (creating if needed) the jobs directory and load every record in it.
    ///
    /// Unreadable or corrupt records are logged and skipped.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| JobStoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| JobStoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut jobs = HashMap::new();
        let mut skipped = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    warn!(dir = %dir.display(), error = %source, "failed to list job records");
                    break;
                }
            };
            let path = entry.path();
            if is_temp_record(&path) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => info!(path = %path.display(), "removed stale temp record"),
                    Err(err) => warn!(path = %path.display(), error = %err, "failed to remove temp record"),
                }
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match load_record(&path).await {
                Ok(job) => {
                    jobs.insert(job.id, job);
                }
                Err(reason) => {
                    skipped += 1;
                    warn!(path = %path.display(), error = %reason, "skipping unreadable job record");
                }
            }
        }

        let unfinished = jobs.values().filter(|j| !j.status.is_terminal()).count();
        info!(
            dir = %dir.display(),
            loaded = jobs.len(),
            unfinished,
            skipped,
            "job store opened"
        );

        Ok(Self {
            dir,
            jobs: RwLock::new(jobs),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.{RECORD_EXT}"))
    }
}

fn is_temp_record(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

async fn load_record(path: &Path) -> Result<Job, String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let bytes =
            serde_json::to_vec_pretty(job).map_err(|e| JobStoreError::Serialize(job.id, e))?;

        {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            jobs.insert(job.id, job.clone());
        }

        let path = self.record_path(job.id);
        let tmp = self.dir.join(format!("{}{TEMP_SUFFIX}", job.id));
        let written = match tokio::fs::write(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await.map_err(|source| (path.clone(), source)),
            Err(source) => Err((tmp.clone(), source)),
        };
        if let Err((path, source)) = written {
            if let Err(err) = tokio::fs::remove_file(&tmp).await {
                warn!(path = %tmp.display(), error = %err, "failed to remove temp record");
            }
            return Err(JobStoreError::Io { path, source });
        }

        debug!(job_id = %job.id, status = %job.status, "job record saved");
        Ok(())
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&job_id).cloned())
    }

    fn list(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(newest_first(jobs.values(), limit))
    }
}
