//! Integration tests for the job dispatcher
//!
//! Tests cover:
//! - Concurrency cap
//! - Oldest-first claiming
//! - No double claims
//! - Stale sweep and late finishes
//! - User scoping
//! - Run loop lifecycle

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use storyforge::dispatcher::{DispatcherConfig, JobDispatcher};
use storyforge::job::{InMemoryJobStore, JobFilter, JobRecord, JobStatus, JobStore, NewJob};
use storyforge::validation::ValidationConfig;

use super::support::{router_with, ScriptedGenerator, ScriptedScorer};

fn config(max_concurrent_jobs: usize) -> DispatcherConfig {
    DispatcherConfig {
        poll_interval_secs: 1,
        max_concurrent_jobs,
        stale_threshold_secs: 1,
        shutdown_grace_secs: 5,
        ..DispatcherConfig::default()
    }
}

fn create_dispatcher(
    generator: Arc<ScriptedGenerator>,
    config: DispatcherConfig,
) -> (Arc<InMemoryJobStore>, Arc<JobDispatcher>) {
    let (store, router) = router_with(
        generator,
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    (store, Arc::new(JobDispatcher::new(router, config)))
}

fn image_job(prompt: &str) -> NewJob {
    NewJob::new("image-generation", json!({ "prompt": prompt }))
}

async fn statuses(store: &InMemoryJobStore) -> Vec<JobStatus> {
    store
        .list(&JobFilter::default(), 100)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.status)
        .collect()
}

#[tokio::test]
async fn test_claims_respect_concurrency_cap() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(100));
    let (store, dispatcher) = create_dispatcher(generator.clone(), config(2));
    for n in 0..5 {
        store.create(image_job(&format!("kite {}", n))).await.unwrap();
    }

    assert!(dispatcher.poll_once().await);
    assert_eq!(dispatcher.inflight().len(), 2);
    assert!(!dispatcher.poll_once().await);
    assert_eq!(dispatcher.stats().claimed, 2);

    while statuses(&store)
        .await
        .iter()
        .any(|s| *s != JobStatus::Completed)
    {
        dispatcher.poll_once().await;
        assert!(dispatcher.inflight().len() <= 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
    let stats = dispatcher.stats();
    assert_eq!(stats.claimed, 5);
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(generator.image_calls(), 5);
}

#[tokio::test]
async fn test_oldest_pending_job_is_claimed_first() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(50));
    let (store, dispatcher) = create_dispatcher(generator, config(1));
    let base = chrono::Utc::now();
    let mut ids = Vec::new();
    for offset in [30, 10, 20] {
        let mut record = JobRecord::create(image_job(&format!("offset {}", offset)));
        record.created_at = base + chrono::Duration::seconds(offset);
        ids.push((offset, record.id.clone()));
        store.insert(record);
    }

    assert!(dispatcher.poll_once().await);
    let claimed: Vec<_> = dispatcher
        .inflight()
        .snapshot()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    let oldest = ids.iter().find(|(offset, _)| *offset == 10).unwrap();
    assert_eq!(claimed, vec![oldest.1.clone()]);

    assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_job_is_never_claimed_twice() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(100));
    let (store, dispatcher) = create_dispatcher(generator.clone(), config(3));
    store.create(image_job("a single kite")).await.unwrap();

    // The second poll can still see the job as pending in the store.
    assert!(dispatcher.poll_once().await);
    assert!(!dispatcher.poll_once().await);
    assert_eq!(dispatcher.stats().claimed, 1);

    assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(generator.image_calls(), 1);
    assert_eq!(dispatcher.stats().completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_sweep_frees_slot_and_counts_late_finish() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_secs(5));
    let (store, dispatcher) = create_dispatcher(generator, config(1));
    let first = store.create(image_job("slow kite")).await.unwrap();
    let mut second = JobRecord::create(image_job("next kite"));
    second.created_at = first.created_at + chrono::Duration::seconds(1);
    store.insert(second.clone());

    assert!(dispatcher.poll_once().await);
    tokio::task::yield_now().await;
    assert!(dispatcher.inflight().contains(&first.id));
    assert_eq!(
        store.get(&first.id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
    assert!(dispatcher.sweep_stale().is_empty());

    tokio::time::advance(Duration::from_secs(2)).await;
    let evicted = dispatcher.sweep_stale();
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].job_id, first.id);
    assert!(dispatcher.inflight().is_empty());

    // The freed slot goes to the next pending job; the first is still processing.
    assert!(dispatcher.poll_once().await);
    assert!(dispatcher.inflight().contains(&second.id));

    assert!(dispatcher.wait_idle(Duration::from_secs(30)).await);
    let stats = dispatcher.stats();
    assert_eq!(stats.stale_evicted, 1);
    assert_eq!(stats.late_finishes, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(
        store.get(&first.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_wait_idle_times_out_while_jobs_run() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(500));
    let (store, dispatcher) = create_dispatcher(generator, config(1));
    store.create(image_job("slow kite")).await.unwrap();

    assert!(dispatcher.poll_once().await);
    assert!(!dispatcher.wait_idle(Duration::from_millis(20)).await);
    assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_user_filter_limits_claims() {
    let mut cfg = config(5);
    cfg.user_id = Some("ada".to_string());
    let (store, dispatcher) = create_dispatcher(ScriptedGenerator::new(), cfg);
    let mine = store.create(image_job("ada's kite").with_user("ada")).await.unwrap();
    let theirs = store
        .create(image_job("grace's kite").with_user("grace"))
        .await
        .unwrap();

    assert!(dispatcher.poll_once().await);
    assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);

    assert_eq!(
        store.get(&mine.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(
        store.get(&theirs.id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(dispatcher.stats().claimed, 1);
}

#[tokio::test]
async fn test_run_loop_processes_until_stopped() {
    let (store, dispatcher) = create_dispatcher(ScriptedGenerator::new(), config(3));
    for n in 0..3 {
        store.create(image_job(&format!("kite {}", n))).await.unwrap();
    }

    let handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(std::future::pending()).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while statuses(&store)
        .await
        .iter()
        .any(|s| *s != JobStatus::Completed)
    {
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    dispatcher.stop();
    handle.await.unwrap();
    assert_eq!(dispatcher.stats().completed, 3);
}

#[tokio::test]
async fn test_run_loop_exits_on_shutdown_signal() {
    let (_store, dispatcher) = create_dispatcher(ScriptedGenerator::new(), config(1));
    tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.run(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .unwrap();
    assert_eq!(dispatcher.stats().claimed, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn inflight_never_exceeds_max(max in 1usize..4, jobs in 0usize..8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(2));
            let (store, dispatcher) = create_dispatcher(generator, config(max));
            for n in 0..jobs {
                store.create(image_job(&format!("kite {}", n))).await.unwrap();
            }

            let mut polls = 0;
            while statuses(&store)
                .await
                .iter()
                .any(|s| !s.is_terminal())
            {
                dispatcher.poll_once().await;
                assert!(dispatcher.inflight().len() <= max);
                polls += 1;
                assert!(polls < 1000, "dispatcher made no progress");
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            assert!(dispatcher.wait_idle(Duration::from_secs(5)).await);
            assert_eq!(dispatcher.stats().completed, jobs as u64);
        });
    }
}
