//! Durable sled-backed job store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::job::record::{JobFilter, JobRecord, NewJob};
use crate::job::store::{select_pending, select_recent, JobStore};
use crate::types::JobId;

const TREE_JOBS: &str = "jobs";

#[derive(Clone)]
pub struct SledJobStore {
    db: Db,
    jobs: Tree,
    // Serializes read-modify-write cycles; sled itself only guarantees per-key atomicity.
    write_lock: Arc<Mutex<()>>,
}

impl SledJobStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StoreError> {
        let jobs = db.open_tree(TREE_JOBS)?;
        Ok(Self {
            db,
            jobs,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
            id: record.id.to_string(),
            reason: e.to_string(),
        })?;
        self.jobs.insert(record.id.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn load(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let Some(raw) = self.jobs.get(id.as_str().as_bytes())? else {
            return Ok(None);
        };
        decode(id.as_str(), &raw).map(Some)
    }

    fn scan(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut out = Vec::new();
        for entry in self.jobs.iter() {
            let (key, value) = entry?;
            let id = String::from_utf8_lossy(&key).to_string();
            match decode(&id, &value) {
                Ok(record) => out.push(record),
                Err(err) => warn!(key = %id, error = %err, "Skipping undecodable job record"),
            }
        }
        Ok(out)
    }

    fn update_with<F>(&self, id: &JobId, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let _guard = self.write_lock.lock();
        let Some(mut record) = self.load(id)? else {
            return Ok(false);
        };
        if !apply(&mut record) {
            return Ok(false);
        }
        self.put(&record)?;
        if record.status.is_terminal() {
            self.jobs.flush()?;
        }
        debug!(
            job_id = %record.id,
            status = %record.status,
            progress = record.progress,
            "Job record updated"
        );
        Ok(true)
    }
}

fn decode(id: &str, raw: &[u8]) -> Result<JobRecord, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl JobStore for SledJobStore {
    async fn create(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        let record = JobRecord::create(job);
        let _guard = self.write_lock.lock();
        self.put(&record)?;
        self.jobs.flush()?;
        Ok(record)
    }

    async fn list_pending(
        &self,
        filter: &JobFilter,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        Ok(select_pending(self.scan()?, filter, limit))
    }

    async fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        Ok(select_recent(self.scan()?, filter, limit))
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        self.load(id)
    }

    async fn update_progress(
        &self,
        id: &JobId,
        progress: u8,
        step: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.update_with(id, |r| r.apply_progress(progress, step))
    }

    async fn mark_completed(&self, id: &JobId, result: Value) -> Result<bool, StoreError> {
        self.update_with(id, |r| r.apply_completed(result))
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        retryable: bool,
    ) -> Result<bool, StoreError> {
        self.update_with(id, |r| r.apply_failed(error, retryable))
    }

    async fn cancel(&self, id: &JobId) -> Result<bool, StoreError> {
        self.update_with(id, |r| r.apply_cancelled())
    }
}
