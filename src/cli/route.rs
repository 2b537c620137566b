//! CLI route: single route table and run context. Dispatches to the job
//! store, the dispatcher, and presentation.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_dispatcher_summary, format_job_detail, format_job_table};
use crate::config::{ConfigLoader, EngineConfig};
use crate::dispatcher::JobDispatcher;
use crate::error::EngineError;
use crate::job::{JobFilter, JobSpec, JobStore, NewJob, SledJobStore};
use crate::pipeline::PipelineRouter;
use crate::provider::{OpenAiProvider, OpenAiScorer};
use crate::types::JobId;

/// Runtime context for CLI execution: loaded configuration plus lazily
/// opened store. Built from an optional config path using ConfigLoader only.
pub struct RunContext {
    config: EngineConfig,
}

impl RunContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        let config = ConfigLoader::load_validated(config_path.as_deref())?;
        Ok(Self { config })
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn open_store(&self) -> Result<Arc<SledJobStore>, EngineError> {
        let path = self.config.store.resolved_path();
        let store = SledJobStore::open(&path)?;
        Ok(Arc::new(store))
    }

    /// Execute a command and return its rendered output.
    pub async fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        match command {
            Commands::Run {
                user,
                max_concurrent,
            } => self.handle_run(user.clone(), *max_concurrent).await,
            Commands::Enqueue {
                job_type,
                input,
                max_retries,
                user,
            } => {
                self.handle_enqueue(job_type, input, *max_retries, user.as_deref())
                    .await
            }
            Commands::Status { id, format } => {
                let store = self.open_store()?;
                let job = store
                    .get(&JobId::from(id.as_str()))
                    .await?
                    .ok_or_else(|| EngineError::InvalidInput(format!("Job not found: {}", id)))?;
                format_job_detail(&job, format)
            }
            Commands::List {
                limit,
                user,
                format,
            } => {
                let store = self.open_store()?;
                let filter = JobFilter {
                    user_id: user.clone(),
                };
                let jobs = store.list(&filter, *limit).await?;
                format_job_table(&jobs, format)
            }
            Commands::Cancel { id } => {
                let store = self.open_store()?;
                let job_id = JobId::from(id.as_str());
                if store.cancel(&job_id).await? {
                    Ok(format!("Cancelled job {}", job_id))
                } else {
                    match store.get(&job_id).await? {
                        Some(job) => Ok(format!(
                            "Job {} is already {}, nothing to cancel",
                            job_id, job.status
                        )),
                        None => Err(EngineError::InvalidInput(format!(
                            "Job not found: {}",
                            job_id
                        ))),
                    }
                }
            }
            Commands::Config => self.config.to_toml(),
        }
    }

    async fn handle_enqueue(
        &self,
        job_type: &str,
        input: &str,
        max_retries: Option<u32>,
        user: Option<&str>,
    ) -> Result<String, EngineError> {
        let input_data: Value = serde_json::from_str(input)
            .map_err(|e| EngineError::InvalidInput(format!("input is not valid JSON: {}", e)))?;
        JobSpec::decode(job_type, &input_data)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        let mut new_job = NewJob::new(job_type, input_data).with_max_retries(
            max_retries.unwrap_or(self.config.store.default_max_retries),
        );
        if let Some(user) = user {
            new_job = new_job.with_user(user);
        }

        let store = self.open_store()?;
        let record = store.create(new_job).await?;
        info!(job_id = %record.id, job_type = %record.job_type, "Job enqueued");
        Ok(format!("Queued job {} ({})", record.id, record.job_type))
    }

    async fn handle_run(
        &self,
        user: Option<String>,
        max_concurrent: Option<usize>,
    ) -> Result<String, EngineError> {
        let mut dispatcher_config = self.config.dispatcher.clone();
        if user.is_some() {
            dispatcher_config.user_id = user;
        }
        if let Some(max) = max_concurrent {
            if max == 0 {
                return Err(EngineError::InvalidInput(
                    "--max-concurrent must be > 0".to_string(),
                ));
            }
            dispatcher_config.max_concurrent_jobs = max;
        }

        let store: Arc<dyn JobStore> = self.open_store()?;
        let generator = Arc::new(OpenAiProvider::new(&self.config.provider)?);
        let scorer = Arc::new(OpenAiScorer::new(&self.config.provider)?);
        let router = Arc::new(PipelineRouter::new(
            store,
            generator,
            scorer,
            &self.config.validation,
        ));
        let dispatcher = JobDispatcher::new(router, dispatcher_config);

        dispatcher
            .run(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Interrupt received, shutting down"),
                    Err(err) => {
                        warn!(error = %err, "Cannot listen for interrupt, running until stopped");
                        std::future::pending::<()>().await;
                    }
                }
            })
            .await;

        Ok(format_dispatcher_summary(&dispatcher.stats()))
    }
}
