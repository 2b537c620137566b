//! Integration tests for the sled-backed job store

use std::sync::Arc;

use serde_json::json;
use storyforge::job::{JobFilter, JobStatus, JobStore, NewJob, SledJobStore};
use storyforge::pipeline::{JobOutcome, PipelineRouter};
use storyforge::validation::ValidationConfig;
use tempfile::TempDir;

use super::support::{ScriptedGenerator, ScriptedScorer};

#[tokio::test]
async fn test_completed_job_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("jobs");

    let job_id = {
        let store: Arc<dyn JobStore> = Arc::new(SledJobStore::open(&path).unwrap());
        let router = PipelineRouter::new(
            store.clone(),
            ScriptedGenerator::new(),
            ScriptedScorer::always_pass(),
            &ValidationConfig::default(),
        );
        let job = store
            .create(NewJob::new("image-generation", json!({ "prompt": "a lighthouse", "count": 2 })))
            .await
            .unwrap();
        assert_eq!(router.process(job.clone()).await, JobOutcome::Completed);
        job.id
    };

    let reopened = SledJobStore::open(&path).unwrap();
    let record = reopened.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(
        record.result_data.unwrap()["image_urls"],
        json!(["https://images.test/1.png", "https://images.test/2.png"])
    );
    assert!(reopened
        .list_pending(&JobFilter::default(), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_user_filter_scopes_listing() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledJobStore::open(&temp_dir.path().join("jobs")).unwrap();
    store
        .create(NewJob::new("scenes", json!({})).with_user("ada"))
        .await
        .unwrap();
    store
        .create(NewJob::new("scenes", json!({})).with_user("grace"))
        .await
        .unwrap();
    store.create(NewJob::new("scenes", json!({}))).await.unwrap();

    let ada = store.list(&JobFilter::for_user("ada"), 10).await.unwrap();
    assert_eq!(ada.len(), 1);
    assert_eq!(ada[0].user_id.as_deref(), Some("ada"));
    assert_eq!(store.list(&JobFilter::default(), 10).await.unwrap().len(), 3);
}
