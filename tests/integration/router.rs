//! Integration tests for the pipeline router and retry accounting

use std::time::Duration;

use serde_json::json;
use storyforge::error::ProviderError;
use storyforge::job::{JobStatus, JobStore, NewJob};
use storyforge::pipeline::JobOutcome;
use storyforge::validation::ValidationConfig;

use super::support::{forest, fox, router_with, ScriptedGenerator, ScriptedScorer};

#[tokio::test]
async fn test_retryable_failures_exhaust_budget() {
    let generator = ScriptedGenerator::failing(ProviderError::timeout("image timed out"), 3);
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(
            NewJob::new("image-generation", json!({ "prompt": "a lighthouse" }))
                .with_max_retries(3),
        )
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let current = store.get(&job.id).await.unwrap().unwrap();
        outcomes.push(router.process(current).await);
    }

    assert_eq!(
        outcomes,
        vec![
            JobOutcome::RetryScheduled,
            JobOutcome::RetryScheduled,
            JobOutcome::Failed
        ]
    );
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 3);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("image timed out"));
    assert_eq!(generator.image_calls(), 3);

    let again = router.process(record).await;
    assert_eq!(again, JobOutcome::Skipped);
    assert_eq!(generator.image_calls(), 3);
}

#[tokio::test]
async fn test_retry_resets_progress_and_step() {
    let generator = ScriptedGenerator::failing(ProviderError::rate_limit("slow down"), 1);
    let (store, router) = router_with(
        generator,
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new("image-generation", json!({ "prompt": "a lighthouse" })))
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::RetryScheduled);
    let pending = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(pending.progress, 0);
    assert_eq!(pending.current_step.as_deref(), Some("Queued for retry"));

    assert_eq!(router.process(pending).await, JobOutcome::Completed);
    let done = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(done.retry_count, 1);
    assert_eq!(done.progress, 100);
}

#[tokio::test]
async fn test_unknown_job_type_fails_without_retry() {
    let generator = ScriptedGenerator::new();
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new("comic-strip", json!({})).with_max_retries(5))
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::Failed);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert!(record
        .error_message
        .unwrap()
        .contains("Unsupported job type: comic-strip"));
    assert_eq!(generator.image_calls(), 0);
}

#[tokio::test]
async fn test_invalid_input_fails_without_retry() {
    let (store, router) = router_with(
        ScriptedGenerator::new(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new("scenes", json!({ "scenes": [] })))
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::Failed);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_message.unwrap().contains("no scenes"));
}

#[tokio::test]
async fn test_quality_rejection_is_terminal() {
    let generator = ScriptedGenerator::new();
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_fail(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(
            NewJob::new(
                "image-generation",
                json!({ "prompt": "Pip waves", "character": fox() }),
            )
            .with_max_retries(3),
        )
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::Failed);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 1);
    let message = record.error_message.unwrap();
    assert!(message.contains("after 3 attempts"));
    assert!(message.contains("required 70"));
    assert_eq!(generator.image_calls(), 3);
}

#[tokio::test]
async fn test_completed_job_carries_validation_history() {
    let (store, router) = router_with(
        ScriptedGenerator::new(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new(
            "scenes",
            json!({
                "scenes": ["Pip wakes up", "Pip finds the map"],
                "character": fox(),
                "environment": forest(),
            }),
        ))
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::Completed);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    let result = record.result_data.unwrap();
    assert_eq!(result["image_urls"].as_array().unwrap().len(), 2);
    assert_eq!(result["validation"]["panel_threshold"], 70);
    assert_eq!(result["validation"]["pages"][0]["coherence"], 100);
}

#[tokio::test]
async fn test_auto_story_runs_every_stage() {
    let generator = ScriptedGenerator::new();
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new(
            "auto-story",
            json!({
                "character_image_url": "https://uploads.test/pip.png",
                "character_name": "Pip",
                "theme": "the lost lantern",
                "page_count": 3,
                "panels_per_page": 2,
                "validate_consistency": true,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(router.process(job.clone()).await, JobOutcome::Completed);
    assert_eq!(generator.describe_calls(), 1);
    assert_eq!(generator.story_calls(), 1);
    assert_eq!(generator.image_calls(), 6);

    let result = store.get(&job.id).await.unwrap().unwrap().result_data.unwrap();
    assert!(result["character_description"]
        .as_str()
        .unwrap()
        .contains("red scarf"));
    let pages = result["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0]["image_urls"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_job_is_skipped() {
    let generator = ScriptedGenerator::new();
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new("cartoonize", json!({ "image_url": "https://uploads.test/a.png" })))
        .await
        .unwrap();
    assert!(store.cancel(&job.id).await.unwrap());

    let current = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(router.process(current).await, JobOutcome::Skipped);
    assert_eq!(generator.describe_calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_processing_wins() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(200));
    let (store, router) = router_with(
        generator,
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new("image-generation", json!({ "prompt": "a kite" })))
        .await
        .unwrap();

    let handle = {
        let router = router.clone();
        let job = job.clone();
        tokio::spawn(async move { router.process(job).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.cancel(&job.id).await.unwrap());

    assert_eq!(handle.await.unwrap(), JobOutcome::Skipped);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(record.result_data.is_none());
}

#[tokio::test]
async fn test_cancel_stops_remaining_images() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(100));
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new(
            "image-generation",
            json!({ "prompt": "a paper boat", "count": 5 }),
        ))
        .await
        .unwrap();

    let handle = {
        let router = router.clone();
        let job = job.clone();
        tokio::spawn(async move { router.process(job).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.cancel(&job.id).await.unwrap());
    let calls_at_cancel = generator.image_calls();

    assert_eq!(handle.await.unwrap(), JobOutcome::Skipped);
    assert_eq!(calls_at_cancel, 1);
    assert_eq!(generator.image_calls(), calls_at_cancel);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert!(record.result_data.is_none());
}

#[tokio::test]
async fn test_cancel_stops_remaining_storybook_pages() {
    let generator = ScriptedGenerator::new().with_delay(Duration::from_millis(100));
    let (store, router) = router_with(
        generator.clone(),
        ScriptedScorer::always_pass(),
        &ValidationConfig::default(),
    );
    let job = store
        .create(NewJob::new(
            "storybook",
            json!({
                "title": "Pip and the Lantern",
                "pages": [
                    { "text": "Pip wakes up." },
                    { "text": "Pip finds the map." },
                    { "text": "Pip reaches the hill." },
                ],
            }),
        ))
        .await
        .unwrap();

    let handle = {
        let router = router.clone();
        let job = job.clone();
        tokio::spawn(async move { router.process(job).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.cancel(&job.id).await.unwrap());

    assert_eq!(handle.await.unwrap(), JobOutcome::Skipped);
    assert_eq!(generator.image_calls(), 1);
    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
}
