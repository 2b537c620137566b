//! Job dispatcher
//!
//! A single poller claims pending jobs under a concurrency cap and runs
//! each one as an independent task through the [`PipelineRouter`]. The
//! in-flight registry is advisory bookkeeping; the job store stays the
//! source of truth for job status.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::job::{JobFilter, JobRecord, JobStore};
use crate::pipeline::{JobOutcome, PipelineRouter};
use crate::types::ClaimToken;

pub mod inflight;

pub use inflight::{ClaimGuard, InFlightEntry, InFlightRegistry, StaleJob};

/// `[dispatcher]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Pending jobs fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stale_sweep_interval_secs")]
    pub stale_sweep_interval_secs: u64,
    /// In-flight entries older than this are dropped by the sweep
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: u64,
    /// How long shutdown waits for running jobs
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Only claim jobs owned by this user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_batch_size() -> usize {
    10
}

fn default_stale_sweep_interval_secs() -> u64 {
    300
}

fn default_stale_threshold_secs() -> u64 {
    600
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            batch_size: default_batch_size(),
            stale_sweep_interval_secs: default_stale_sweep_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            user_id: None,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be > 0".to_string());
        }
        if self.max_concurrent_jobs == 0 {
            errors.push("max_concurrent_jobs must be > 0".to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be > 0".to_string());
        }
        if self.stale_sweep_interval_secs == 0 {
            errors.push("stale_sweep_interval_secs must be > 0".to_string());
        }
        if self.stale_threshold_secs == 0 {
            errors.push("stale_threshold_secs must be > 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn filter(&self) -> JobFilter {
        JobFilter {
            user_id: self.user_id.clone(),
        }
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub claimed: u64,
    pub completed: u64,
    pub failed: u64,
    pub retry_scheduled: u64,
    pub skipped: u64,
    /// Terminal writes that did not reach the store
    pub unrecorded: u64,
    pub stale_evicted: u64,
    /// Jobs that finished after the sweep had dropped their entry
    pub late_finishes: u64,
    pub in_flight: usize,
}

impl DispatcherStats {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::RetryScheduled => self.retry_scheduled += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Unrecorded => self.unrecorded += 1,
        }
    }
}

/// Clears the polling flag when a poll cycle ends, however it ends.
struct PollingFlag<'a>(&'a AtomicBool);

impl Drop for PollingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    router: Arc<PipelineRouter>,
    config: DispatcherConfig,
    inflight: Arc<InFlightRegistry>,
    polling: AtomicBool,
    running: AtomicBool,
    stop: Notify,
    stats: Arc<RwLock<DispatcherStats>>,
    tasks: Mutex<JoinSet<()>>,
}

impl JobDispatcher {
    pub fn new(router: Arc<PipelineRouter>, config: DispatcherConfig) -> Self {
        Self {
            store: router.store().clone(),
            router,
            config,
            inflight: InFlightRegistry::shared(),
            polling: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop: Notify::new(),
            stats: Arc::new(RwLock::new(DispatcherStats::default())),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn inflight(&self) -> &Arc<InFlightRegistry> {
        &self.inflight
    }

    /// One poll cycle. Returns whether any job was newly claimed.
    ///
    /// No-op while another poll is running or when the in-flight set is
    /// full. Candidates come oldest first; those beyond capacity stay
    /// pending for a later poll.
    pub async fn poll_once(&self) -> bool {
        if self.polling.swap(true, Ordering::SeqCst) {
            debug!("Poll already in progress, skipping");
            return false;
        }
        let _flag = PollingFlag(&self.polling);
        self.reap_finished();

        let max = self.config.max_concurrent_jobs;
        if !self.inflight.has_capacity(max) {
            debug!(in_flight = self.inflight.len(), max, "At capacity, skipping poll");
            return false;
        }

        let candidates = match self
            .store
            .list_pending(&self.config.filter(), self.config.batch_size)
            .await
        {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(error = %err, "Failed to list pending jobs");
                return false;
            }
        };

        let mut claimed_any = false;
        for job in candidates {
            if !self.inflight.has_capacity(max) {
                debug!(max, "Capacity reached, leaving remaining jobs pending");
                break;
            }
            let Some(token) = self.inflight.try_claim(&job.id, &job.job_type, max) else {
                continue;
            };
            claimed_any = true;
            self.stats.write().claimed += 1;
            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                token = token.as_u64(),
                in_flight = self.inflight.len(),
                "Job claimed"
            );
            self.spawn_job(job, token);
        }
        claimed_any
    }

    fn spawn_job(&self, job: JobRecord, token: ClaimToken) {
        let guard = ClaimGuard::new(self.inflight.clone(), job.id.clone(), token);
        let router = Arc::clone(&self.router);
        let stats = Arc::clone(&self.stats);

        self.tasks.lock().spawn(async move {
            let job_id = job.id.clone();
            let outcome = router.process(job).await;
            let still_held = guard.release();

            let mut stats = stats.write();
            stats.record(outcome);
            if !still_held {
                stats.late_finishes += 1;
                warn!(
                    job_id = %job_id,
                    ?outcome,
                    "Job finished after its in-flight entry was swept as stale"
                );
            }
        });
    }

    /// Drop in-flight entries past the stale threshold.
    ///
    /// The underlying tasks keep running and may still write their result;
    /// their claim tokens no longer match, so they cannot evict a newer claim.
    pub fn sweep_stale(&self) -> Vec<StaleJob> {
        let evicted = self.inflight.evict_stale(self.config.stale_threshold());
        for stale in &evicted {
            warn!(
                job_id = %stale.job_id,
                job_type = %stale.job_type,
                age_secs = stale.age.as_secs(),
                "Evicted stale in-flight job"
            );
        }
        if !evicted.is_empty() {
            self.stats.write().stale_evicted += evicted.len() as u64;
        }
        evicted
    }

    /// Poll and sweep on their intervals until `shutdown` resolves or
    /// [`stop`](Self::stop) is called, then drain running jobs.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Dispatcher already running");
            return;
        }

        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let sweep_every = self.config.stale_sweep_interval();
        let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            poll_interval_secs = self.config.poll_interval_secs,
            "Job dispatcher started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.stop.notified() => break,
                _ = poll.tick() => {
                    self.poll_once().await;
                }
                _ = sweep.tick() => {
                    self.sweep_stale();
                }
            }
        }

        self.shutdown().await;
    }

    /// Ask a running [`run`](Self::run) loop to exit.
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// Stop claiming and wait (bounded) for running jobs to finish.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let remaining = tasks.len();
        if remaining > 0 {
            info!(remaining, "Waiting for in-flight jobs to finish");
        }

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "Job task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                still_running = tasks.len(),
                "Shutdown grace period elapsed, detaching running jobs"
            );
            tasks.detach_all();
        }
        info!("Job dispatcher stopped");
    }

    /// Wait until no jobs are in flight, or `timeout` elapses.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.reap_finished();
            if self.tasks.lock().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        let mut stats = self.stats.read().clone();
        stats.in_flight = self.inflight.len();
        stats
    }

    fn reap_finished(&self) {
        let mut tasks = self.tasks.lock();
        while let Some(joined) = tasks.try_join_next() {
            if let Err(err) = joined {
                error!(error = %err, "Job task panicked");
            }
        }
    }
}
