//! Error types for the StoryForge job engine.

use crate::types::JobId;
use crate::validation::score::Score;
use std::fmt;
use thiserror::Error;

/// Job store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StoreError::IoError(io),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Failure classes reported by generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Timeout,
    Connection,
    Authentication,
    RateLimit,
    Validation,
    Unknown,
}

impl ProviderErrorKind {
    /// Authentication and malformed-input failures never succeed on retry.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ProviderErrorKind::Authentication | ProviderErrorKind::Validation
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Connection => "connection",
            ProviderErrorKind::Authentication => "authentication",
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::Validation => "validation",
            ProviderErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified provider failure
#[derive(Debug, Clone, Error)]
#[error("Provider {kind} error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Validation, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Which visual unit exhausted its regeneration budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityUnit {
    Panel { page: usize, panel: usize },
    Page { page: usize },
}

impl fmt::Display for QualityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityUnit::Panel { page, panel } => {
                write!(f, "Panel {} on page {} failed character consistency", panel, page)
            }
            QualityUnit::Page { page } => {
                write!(f, "Page {} cannot maintain world consistency", page)
            }
        }
    }
}

/// Errors raised while executing a job's pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(
        "{unit} after {attempts} attempts: best score {best_score} (required {threshold}). Issues: {}",
        format_reasons(.reasons)
    )]
    QualityRejected {
        unit: QualityUnit,
        best_score: Score,
        threshold: u8,
        attempts: u32,
        reasons: Vec<String>,
    },

    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),

    /// The record went terminal (cancelled, or finished elsewhere) mid-run
    #[error("Job stopped: {0}")]
    Stopped(String),
}

impl PipelineError {
    /// Whether the store should schedule another attempt for the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Provider(err) => err.is_retryable(),
            PipelineError::QualityRejected { .. }
            | PipelineError::Stopped(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::UnsupportedJobType(_) => false,
        }
    }
}

fn format_reasons(reasons: &[String]) -> String {
    if reasons.is_empty() {
        "none reported".to_string()
    } else {
        reasons.join("; ")
    }
}

/// Engine-level errors (configuration, startup, CLI)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Invalid job input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}
