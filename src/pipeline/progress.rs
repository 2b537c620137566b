//! Store-visible progress reporting for one job.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::job::JobStore;
use crate::types::JobId;

/// Reports progress milestones for a single running job.
///
/// Reported progress never decreases. Store failures are logged and
/// swallowed: losing a progress update must not fail the job.
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    last: u8,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        Self {
            store,
            job_id,
            last: 0,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    /// Report a milestone. Returns `false` when the store refused the update
    /// (the record is terminal or gone) or could not be reached.
    pub async fn report(&mut self, progress: u8, step: &str) -> bool {
        let progress = progress.min(100).max(self.last);
        match self
            .store
            .update_progress(&self.job_id, progress, Some(step))
            .await
        {
            Ok(updated) => {
                self.last = progress;
                debug!(job_id = %self.job_id, progress, step, updated, "Progress reported");
                updated
            }
            Err(err) => {
                warn!(job_id = %self.job_id, progress, step, error = %err, "Failed to report progress");
                false
            }
        }
    }

    /// Report a milestone between units of work.
    ///
    /// A refused update is confirmed with a fresh read: a terminal or
    /// missing record stops the job with [`PipelineError::Stopped`]. Store
    /// outages are swallowed like any other lost progress update.
    pub async fn checkpoint(&mut self, progress: u8, step: &str) -> Result<(), PipelineError> {
        if self.report(progress, step).await {
            return Ok(());
        }
        match self.store.get(&self.job_id).await {
            Ok(Some(record)) if record.status.is_terminal() => {
                Err(PipelineError::Stopped(format!("job is {}", record.status)))
            }
            Ok(None) => Err(PipelineError::Stopped("job record is gone".to_string())),
            Ok(Some(_)) => Ok(()),
            Err(err) => {
                warn!(job_id = %self.job_id, error = %err, "Cannot confirm job state, continuing");
                Ok(())
            }
        }
    }

    /// [`checkpoint`](Self::checkpoint) at `done` of `total` units mapped
    /// onto the `start..=end` range.
    pub async fn checkpoint_fraction(
        &mut self,
        start: u8,
        end: u8,
        done: usize,
        total: usize,
        step: &str,
    ) -> Result<(), PipelineError> {
        self.checkpoint(proportional(start, end, done, total), step).await
    }
}

/// Linear interpolation of `done / total` between `start` and `end`.
pub fn proportional(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 || end <= start {
        return end.max(start);
    }
    let span = usize::from(end - start);
    let done = done.min(total);
    start + (span * done / total) as u8
}
