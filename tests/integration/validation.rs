//! Integration tests for the panel and page regeneration loops

use std::sync::Arc;

use storyforge::error::{PipelineError, ProviderError, ProviderErrorKind, QualityUnit};
use storyforge::validation::{PageRequest, PageValidator, PanelRequest, Score, ValidationConfig};

use super::support::{forest, fox, ScriptedGenerator, ScriptedScorer};

fn validator(
    generator: &Arc<ScriptedGenerator>,
    scorer: &Arc<ScriptedScorer>,
    panel_threshold: u8,
    page_threshold: u8,
) -> PageValidator {
    ValidationConfig {
        panel_threshold,
        page_threshold,
        ..ValidationConfig::default()
    }
    .build(generator.clone(), scorer.clone())
}

fn panel_request<'a>(
    reference: Option<&'a storyforge::provider::CharacterDna>,
) -> PanelRequest<'a> {
    PanelRequest {
        page: 1,
        panel: 1,
        prompt: "The fox finds a lantern",
        style: "watercolor",
        continuity_reference: None,
        reference,
    }
}

#[tokio::test]
async fn test_panel_passes_on_third_attempt() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::panel_sequence(&[60, 75, 92]);
    let pages = validator(&generator, &scorer, 90, 70);
    let character = fox();

    let panel = pages
        .panels()
        .generate(&panel_request(Some(&character)))
        .await
        .unwrap();

    assert_eq!(panel.score, Score::Scored(92));
    assert_eq!(panel.attempt_count(), 3);
    assert_eq!(panel.image_url, "https://images.test/3.png");
    assert_eq!(generator.image_calls(), 3);
    assert_eq!(scorer.panel_calls(), 3);

    let prompts: Vec<String> = generator
        .image_requests()
        .into_iter()
        .map(|r| r.prompt)
        .collect();
    assert_eq!(prompts[0], "The fox finds a lantern");
    assert!(prompts[1].starts_with("The fox finds a lantern"));
    assert!(prompts[1].contains("Keep the character consistent"));
    assert!(prompts[1].contains("looks different (score 60)"));
    assert!(prompts[2].contains("CRITICAL"));
    assert!(prompts[2].contains("looks different (score 75)"));
}

#[tokio::test]
async fn test_panel_rejected_after_three_attempts() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::always_fail();
    let pages = validator(&generator, &scorer, 70, 70);
    let character = fox();

    let err = pages
        .panels()
        .generate(&panel_request(Some(&character)))
        .await
        .unwrap_err();

    match &err {
        PipelineError::QualityRejected {
            unit,
            best_score,
            threshold,
            attempts,
            reasons,
        } => {
            assert_eq!(*unit, QualityUnit::Panel { page: 1, panel: 1 });
            assert_eq!(*best_score, Score::Scored(0));
            assert_eq!(*threshold, 70);
            assert_eq!(*attempts, 3);
            assert_eq!(reasons.len(), 1);
        }
        other => panic!("expected quality rejection, got {:?}", other),
    }
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("failed character consistency"));
    assert_eq!(generator.image_calls(), 3);
}

#[tokio::test]
async fn test_unavailable_scorer_accepts_first_image() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::unavailable();
    let pages = validator(&generator, &scorer, 95, 95);
    let character = fox();

    let panel = pages
        .panels()
        .generate(&panel_request(Some(&character)))
        .await
        .unwrap();

    assert!(panel.score.is_unavailable());
    assert_eq!(panel.attempt_count(), 1);
    assert_eq!(generator.image_calls(), 1);
}

#[tokio::test]
async fn test_passing_scorer_exits_on_first_attempt() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::always_pass();
    let pages = validator(&generator, &scorer, 70, 70);
    let character = fox();

    let panel = pages
        .panels()
        .generate(&panel_request(Some(&character)))
        .await
        .unwrap();

    assert_eq!(panel.attempt_count(), 1);
    assert_eq!(generator.image_calls(), 1);
}

#[tokio::test]
async fn test_panel_without_reference_is_not_scored() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::always_fail();
    let pages = validator(&generator, &scorer, 70, 70);

    let panel = pages.panels().generate(&panel_request(None)).await.unwrap();

    assert!(panel.score.is_unavailable());
    assert_eq!(scorer.panel_calls(), 0);
    assert_eq!(generator.image_calls(), 1);
}

#[tokio::test]
async fn test_provider_error_aborts_panel_loop() {
    let generator = ScriptedGenerator::failing(ProviderError::timeout("image timed out"), 1);
    let scorer = ScriptedScorer::always_pass();
    let pages = validator(&generator, &scorer, 70, 70);
    let character = fox();

    let err = pages
        .panels()
        .generate(&panel_request(Some(&character)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Provider(ref e) if e.kind == ProviderErrorKind::Timeout
    ));
    assert!(err.is_retryable());
    assert_eq!(generator.image_calls(), 1);
    assert_eq!(scorer.panel_calls(), 0);
}

#[tokio::test]
async fn test_page_rejected_after_two_attempts() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::page_sequence(&[70, 72]);
    let pages = validator(&generator, &scorer, 70, 85);
    let character = fox();
    let environment = forest();
    let prompts = vec![
        "The fox leaves the den".to_string(),
        "The fox crosses the creek".to_string(),
    ];

    let err = pages
        .generate(&PageRequest {
            page: 1,
            panel_prompts: &prompts,
            style: "watercolor",
            character: Some(&character),
            environment: Some(&environment),
        })
        .await
        .unwrap_err();

    match err {
        PipelineError::QualityRejected {
            unit,
            best_score,
            attempts,
            threshold,
            ..
        } => {
            assert_eq!(unit, QualityUnit::Page { page: 1 });
            assert_eq!(best_score, Score::Scored(72));
            assert_eq!(attempts, 2);
            assert_eq!(threshold, 85);
        }
        other => panic!("expected quality rejection, got {:?}", other),
    }
    // Every panel is regenerated on the second page attempt.
    assert_eq!(generator.image_calls(), prompts.len() * 2);
    assert_eq!(scorer.page_calls(), 2);
}

#[tokio::test]
async fn test_page_retry_reinforces_every_panel() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::page_sequence(&[60, 90]);
    let pages = validator(&generator, &scorer, 70, 85);
    let character = fox();
    let environment = forest();
    let prompts = vec![
        "The fox leaves the den".to_string(),
        "The fox crosses the creek".to_string(),
        "The fox reaches the clearing".to_string(),
    ];

    let page = pages
        .generate(&PageRequest {
            page: 2,
            panel_prompts: &prompts,
            style: "watercolor",
            character: Some(&character),
            environment: Some(&environment),
        })
        .await
        .unwrap();

    assert_eq!(page.coherence, Score::Scored(90));
    assert_eq!(page.attempts.len(), 2);
    assert!(page.attempts[0].reinforcement.is_none());
    assert!(page.attempts[1].reinforcement.is_some());
    assert_eq!(page.panels.len(), 3);
    assert_eq!(
        page.image_urls(),
        vec![
            "https://images.test/4.png",
            "https://images.test/5.png",
            "https://images.test/6.png",
        ]
    );

    let requests = generator.image_requests();
    assert_eq!(requests.len(), 6);
    for first in &requests[..3] {
        assert!(!first.prompt.contains("ENVIRONMENT"));
    }
    for retry in &requests[3..] {
        assert!(retry.prompt.contains("ENVIRONMENT (must be identical"));
        assert!(retry.prompt.contains("golden hour"));
        assert!(retry.prompt.contains("lighting drifts away"));
    }
}

#[tokio::test]
async fn test_panels_continue_from_previous_image() {
    let generator = ScriptedGenerator::new();
    let scorer = ScriptedScorer::always_pass();
    let pages = validator(&generator, &scorer, 70, 70);
    let prompts = vec![
        "Morning".to_string(),
        "Noon".to_string(),
        "Evening".to_string(),
    ];

    pages
        .generate(&PageRequest {
            page: 1,
            panel_prompts: &prompts,
            style: "watercolor",
            character: None,
            environment: None,
        })
        .await
        .unwrap();

    let references: Vec<Option<String>> = generator
        .image_requests()
        .into_iter()
        .map(|r| r.continuity_reference)
        .collect();
    assert_eq!(
        references,
        vec![
            None,
            Some("https://images.test/1.png".to_string()),
            Some("https://images.test/2.png".to_string()),
        ]
    );
    assert_eq!(scorer.page_calls(), 0);
}
