//! Pipeline router: runs a claimed job and records its terminal outcome.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::job::record::STEP_STARTING;
use crate::job::{JobRecord, JobSpec, JobStatus, JobStore};
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::stages::Stages;
use crate::provider::{GenerationProvider, QualityScorer};
use crate::types::JobId;
use crate::validation::ValidationConfig;

/// What happened to a job handed to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Failed retryably with budget left; the store put it back to pending
    RetryScheduled,
    Failed,
    /// Already terminal (e.g. cancelled) before or during the run
    Skipped,
    /// The terminal write itself failed; the record may still read `processing`
    Unrecorded,
}

pub struct PipelineRouter {
    store: Arc<dyn JobStore>,
    stages: Stages,
}

impl PipelineRouter {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn GenerationProvider>,
        scorer: Arc<dyn QualityScorer>,
        validation: &ValidationConfig,
    ) -> Self {
        let pages = validation.build(generator.clone(), scorer);
        Self {
            store,
            stages: Stages::new(generator, pages),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Run a claimed job to a terminal decision.
    pub async fn process(&self, job: JobRecord) -> JobOutcome {
        if job.status.is_terminal() {
            info!(job_id = %job.id, status = %job.status, "Job already terminal, skipping");
            return JobOutcome::Skipped;
        }

        let mut progress = ProgressReporter::new(self.store.clone(), job.id.clone());
        if job.status == JobStatus::Pending
            && !progress.report(1, STEP_STARTING).await
            && self.is_terminal(&job.id).await
        {
            info!(job_id = %job.id, "Job became terminal before start, skipping");
            return JobOutcome::Skipped;
        }

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.retry_count + 1,
            "Processing job"
        );

        let result = match JobSpec::decode(&job.job_type, &job.input_data) {
            Ok(spec) => self.execute(spec, &mut progress).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(output) => self.complete(&job, output).await,
            Err(PipelineError::Stopped(reason)) => {
                info!(job_id = %job.id, reason = %reason, "Job stopped before finishing, skipping");
                JobOutcome::Skipped
            }
            Err(err) => self.fail(&job, err).await,
        }
    }

    async fn execute(
        &self,
        spec: JobSpec,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        match spec {
            JobSpec::Storybook(input) => self.stages.storybook(&input, progress).await,
            JobSpec::AutoStory(input) => self.stages.auto_story(&input, progress).await,
            JobSpec::Scenes(input) => self.stages.scenes(&input, progress).await,
            JobSpec::Cartoonize(input) => self.stages.cartoonize(&input, progress).await,
            JobSpec::ImageGeneration(input) => {
                self.stages.image_generation(&input, progress).await
            }
        }
    }

    async fn complete(&self, job: &JobRecord, output: Value) -> JobOutcome {
        match self.store.mark_completed(&job.id, output).await {
            Ok(true) => {
                info!(job_id = %job.id, job_type = %job.job_type, "Job completed");
                JobOutcome::Completed
            }
            Ok(false) => {
                warn!(job_id = %job.id, "Completion not recorded, job already terminal");
                JobOutcome::Skipped
            }
            Err(err) => {
                error!(job_id = %job.id, error = %err, "Failed to record job completion");
                JobOutcome::Unrecorded
            }
        }
    }

    async fn fail(&self, job: &JobRecord, err: PipelineError) -> JobOutcome {
        let retryable = err.is_retryable();
        let message = err.to_string();
        match self.store.mark_failed(&job.id, &message, retryable).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    job_id = %job.id,
                    error = %message,
                    "Failure not recorded, job already terminal"
                );
                return JobOutcome::Skipped;
            }
            Err(store_err) => {
                error!(
                    job_id = %job.id,
                    error = %message,
                    store_error = %store_err,
                    "Failed to record job failure"
                );
                return JobOutcome::Unrecorded;
            }
        }

        let requeued = matches!(
            self.store.get(&job.id).await,
            Ok(Some(ref record)) if record.status == JobStatus::Pending
        );
        if requeued {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                retry_count = job.retry_count + 1,
                max_retries = job.max_retries,
                error = %message,
                "Job failed, retry scheduled"
            );
            JobOutcome::RetryScheduled
        } else {
            error!(
                job_id = %job.id,
                job_type = %job.job_type,
                retryable,
                error = %message,
                "Job failed"
            );
            JobOutcome::Failed
        }
    }

    async fn is_terminal(&self, id: &JobId) -> bool {
        matches!(self.store.get(id).await, Ok(Some(ref r)) if r.status.is_terminal())
    }
}
