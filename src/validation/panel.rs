//! Panel-level bounded regeneration loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, QualityUnit};
use crate::provider::{CharacterDna, GenerationProvider, QualityScorer, SceneImageParams};
use crate::validation::prompt::enhanced_panel_prompt;
use crate::validation::score::Score;

/// One panel to draw
#[derive(Debug, Clone)]
pub struct PanelRequest<'a> {
    /// 1-based page number
    pub page: usize,
    /// 1-based panel number within the page
    pub panel: usize,
    pub prompt: &'a str,
    pub style: &'a str,
    pub continuity_reference: Option<&'a str>,
    /// No reference means the panel is accepted unscored.
    pub reference: Option<&'a CharacterDna>,
}

/// Record of a single generate-and-score attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelAttempt {
    pub attempt: u32,
    pub prompt: String,
    pub image_url: String,
    pub score: Score,
    pub passes_threshold: bool,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
}

/// A panel that made it through the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedPanel {
    pub page: usize,
    pub panel: usize,
    pub image_url: String,
    pub prompt: String,
    /// Score of the accepted image; `-1` when it was never scored
    pub score: Score,
    pub attempts: Vec<PanelAttempt>,
}

impl AcceptedPanel {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len().max(1) as u32
    }
}

pub struct PanelValidator {
    generator: Arc<dyn GenerationProvider>,
    scorer: Arc<dyn QualityScorer>,
    max_attempts: u32,
    threshold: u8,
}

impl PanelValidator {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        scorer: Arc<dyn QualityScorer>,
        max_attempts: u32,
        threshold: u8,
    ) -> Self {
        Self {
            generator,
            scorer,
            max_attempts,
            threshold,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Generate a panel, regenerating with corrective prompts until it passes.
    ///
    /// Provider errors abort immediately. A scorer-unavailable result accepts
    /// the current image. Running out of attempts is a terminal
    /// [`PipelineError::QualityRejected`].
    pub async fn generate(
        &self,
        request: &PanelRequest<'_>,
    ) -> Result<AcceptedPanel, PipelineError> {
        let mut prompt = request.prompt.to_string();
        let mut attempts = Vec::new();
        let mut best = Score::Unavailable;
        let mut reasons: Vec<String> = Vec::new();

        for attempt in 1..=self.max_attempts {
            let image_url = self
                .generator
                .generate_scene_image(&SceneImageParams {
                    prompt: prompt.clone(),
                    style: request.style.to_string(),
                    continuity_reference: request.continuity_reference.map(str::to_string),
                })
                .await?;

            let Some(reference) = request.reference else {
                debug!(
                    page = request.page,
                    panel = request.panel,
                    "No reference character, panel accepted unscored"
                );
                return Ok(AcceptedPanel {
                    page: request.page,
                    panel: request.panel,
                    image_url,
                    prompt,
                    score: Score::Unavailable,
                    attempts,
                });
            };

            let result = self
                .scorer
                .score_panel_consistency(&image_url, reference, self.threshold)
                .await;
            best = best.best_of(result.overall_score);
            attempts.push(PanelAttempt {
                attempt,
                prompt: prompt.clone(),
                image_url: image_url.clone(),
                score: result.overall_score,
                passes_threshold: result.passes_threshold,
                failure_reasons: result.failure_reasons.clone(),
            });

            if result.passes_threshold || result.is_unavailable() {
                if result.is_unavailable() {
                    warn!(
                        page = request.page,
                        panel = request.panel,
                        attempt,
                        "Consistency scorer unavailable, accepting panel unvalidated"
                    );
                } else {
                    info!(
                        page = request.page,
                        panel = request.panel,
                        attempt,
                        score = %result.overall_score,
                        threshold = self.threshold,
                        "Panel passed consistency check"
                    );
                }
                return Ok(AcceptedPanel {
                    page: request.page,
                    panel: request.panel,
                    image_url,
                    prompt,
                    score: result.overall_score,
                    attempts,
                });
            }

            for reason in &result.failure_reasons {
                if !reasons.contains(reason) {
                    reasons.push(reason.clone());
                }
            }

            warn!(
                page = request.page,
                panel = request.panel,
                attempt,
                max_attempts = self.max_attempts,
                score = %result.overall_score,
                threshold = self.threshold,
                "Panel failed consistency check"
            );

            if attempt < self.max_attempts {
                prompt = enhanced_panel_prompt(
                    request.prompt,
                    reference,
                    &result.failure_reasons,
                    attempt + 1,
                );
            }
        }

        Err(PipelineError::QualityRejected {
            unit: QualityUnit::Panel {
                page: request.page,
                panel: request.panel,
            },
            best_score: best,
            threshold: self.threshold,
            attempts: self.max_attempts,
            reasons,
        })
    }
}
