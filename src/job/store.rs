//! Job store contract and in-memory implementation.

use crate::error::StoreError;
use crate::job::record::{JobFilter, JobRecord, JobStatus, NewJob};
use crate::types::JobId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Durable job store.
///
/// The store is the only source of truth for job status. Reporting methods
/// return `Ok(false)` when nothing was updated (unknown id or terminal record)
/// so callers never need to treat a stale write as a crash.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a pending job
    async fn create(&self, job: NewJob) -> Result<JobRecord, StoreError>;

    /// Pending jobs, oldest first
    async fn list_pending(
        &self,
        filter: &JobFilter,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// All jobs, newest first
    async fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<JobRecord>, StoreError>;

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    async fn update_progress(
        &self,
        id: &JobId,
        progress: u8,
        step: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn mark_completed(&self, id: &JobId, result: Value) -> Result<bool, StoreError>;

    async fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        retryable: bool,
    ) -> Result<bool, StoreError>;

    async fn cancel(&self, id: &JobId) -> Result<bool, StoreError>;
}

/// Sort pending candidates oldest-first and cap to `limit`.
pub(crate) fn select_pending<I>(records: I, filter: &JobFilter, limit: usize) -> Vec<JobRecord>
where
    I: IntoIterator<Item = JobRecord>,
{
    let mut pending: Vec<JobRecord> = records
        .into_iter()
        .filter(|r| r.status == JobStatus::Pending && filter.matches(r))
        .collect();
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    pending.truncate(limit);
    pending
}

/// Sort all matching records newest-first and cap to `limit`.
pub(crate) fn select_recent<I>(records: I, filter: &JobFilter, limit: usize) -> Vec<JobRecord>
where
    I: IntoIterator<Item = JobRecord>,
{
    let mut all: Vec<JobRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    all.truncate(limit);
    all
}

/// In-memory job store for tests and single-process development
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert a record as-is (fixtures, imports)
    pub fn insert(&self, record: JobRecord) {
        self.jobs.write().insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    fn update_with<F>(&self, id: &JobId, apply: F) -> bool
    where
        F: FnOnce(&mut JobRecord) -> bool,
    {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(id) {
            Some(record) => apply(record),
            None => false,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        let record = JobRecord::create(job);
        self.insert(record.clone());
        Ok(record)
    }

    async fn list_pending(
        &self,
        filter: &JobFilter,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read();
        Ok(select_pending(jobs.values().cloned(), filter, limit))
    }

    async fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read();
        Ok(select_recent(jobs.values().cloned(), filter, limit))
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update_progress(
        &self,
        id: &JobId,
        progress: u8,
        step: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(self.update_with(id, |r| r.apply_progress(progress, step)))
    }

    async fn mark_completed(&self, id: &JobId, result: Value) -> Result<bool, StoreError> {
        Ok(self.update_with(id, |r| r.apply_completed(result)))
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        error: &str,
        retryable: bool,
    ) -> Result<bool, StoreError> {
        Ok(self.update_with(id, |r| r.apply_failed(error, retryable)))
    }

    async fn cancel(&self, id: &JobId) -> Result<bool, StoreError> {
        Ok(self.update_with(id, |r| r.apply_cancelled()))
    }
}
