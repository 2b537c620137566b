//! Durable job record and its lifecycle transitions.
//!
//! Transition rules live here so every store implementation applies the same
//! semantics: progress is clamped and monotonic within an attempt, completion
//! forces progress to 100, and a failure only re-enters `pending` while the
//! retry budget allows it.

use crate::types::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const STEP_STARTING: &str = "Starting job processing";
pub const STEP_QUEUED_FOR_RETRY: &str = "Queued for retry";

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polling filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub user_id: Option<String>,
}

impl JobFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        match &self.user_id {
            Some(user) => record.user_id.as_deref() == Some(user.as_str()),
            None => true,
        }
    }
}

/// Request to create a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    pub user_id: Option<String>,
    pub input_data: Value,
    pub max_retries: u32,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, input_data: Value) -> Self {
        Self {
            job_type: job_type.into(),
            user_id: None,
            input_data,
            max_retries: 3,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// The unit of durable work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub current_step: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub input_data: Value,
    #[serde(default)]
    pub result_data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Build a fresh pending record
    pub fn create(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            job_type: new_job.job_type,
            user_id: new_job.user_id,
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            retry_count: 0,
            max_retries: new_job.max_retries,
            input_data: new_job.input_data,
            result_data: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Record progress. Returns `false` if the record is terminal.
    ///
    /// A pending record moves to `processing` on its first progress report.
    pub fn apply_progress(&mut self, progress: u8, step: Option<&str>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Processing;
            self.started_at = Some(now);
        }
        self.progress = self.progress.max(progress.min(100));
        if let Some(step) = step {
            self.current_step = Some(step.to_string());
        }
        self.updated_at = now;
        true
    }

    /// Returns `false` if the record is already terminal.
    pub fn apply_completed(&mut self, result: Value) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = Some("Completed".to_string());
        self.result_data = Some(result);
        self.error_message = None;
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Count a failed attempt and decide whether the job is retried.
    ///
    /// Returns `false` if the record is already terminal.
    pub fn apply_failed(&mut self, error: &str, retryable: bool) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.retry_count = self.retry_count.saturating_add(1);
        self.error_message = Some(error.to_string());
        self.updated_at = now;

        if retryable && self.retry_count < self.max_retries {
            self.status = JobStatus::Pending;
            self.progress = 0;
            self.current_step = Some(STEP_QUEUED_FOR_RETRY.to_string());
        } else {
            self.status = JobStatus::Failed;
            self.current_step = Some("Failed".to_string());
            self.completed_at = Some(now);
        }
        true
    }

    /// Returns `false` if the record is already terminal.
    pub fn apply_cancelled(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Cancelled;
        self.current_step = Some("Cancelled".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }
}
