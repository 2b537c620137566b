//! Page-level bounded regeneration loop.
//!
//! A page is an ordered set of panels drawn one at a time through the
//! panel loop, each continuing from the one before it. Environmental drift
//! is a property of the whole set, so a coherence rejection regenerates
//! every panel on the page.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, QualityUnit};
use crate::provider::{CharacterDna, EnvironmentDna, QualityScorer};
use crate::validation::panel::{AcceptedPanel, PanelRequest, PanelValidator};
use crate::validation::prompt::{environment_reinforcement, with_clause};
use crate::validation::score::Score;

#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    /// 1-based page number
    pub page: usize,
    pub panel_prompts: &'a [String],
    pub style: &'a str,
    pub character: Option<&'a CharacterDna>,
    /// No environment means the page is accepted without a coherence check.
    pub environment: Option<&'a EnvironmentDna>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAttempt {
    pub attempt: u32,
    pub coherence: Score,
    pub passes_threshold: bool,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    /// Environment clause appended to every panel prompt on this attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reinforcement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedPage {
    pub page: usize,
    pub panels: Vec<AcceptedPanel>,
    /// Coherence of the accepted panel set; `-1` when never scored
    pub coherence: Score,
    pub attempts: Vec<PageAttempt>,
}

impl AcceptedPage {
    pub fn image_urls(&self) -> Vec<String> {
        self.panels.iter().map(|p| p.image_url.clone()).collect()
    }
}

pub struct PageValidator {
    panels: PanelValidator,
    scorer: Arc<dyn QualityScorer>,
    max_attempts: u32,
    threshold: u8,
}

impl PageValidator {
    pub fn new(
        panels: PanelValidator,
        scorer: Arc<dyn QualityScorer>,
        max_attempts: u32,
        threshold: u8,
    ) -> Self {
        Self {
            panels,
            scorer,
            max_attempts,
            threshold,
        }
    }

    pub fn panels(&self) -> &PanelValidator {
        &self.panels
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Generate every panel on the page and gate the set on coherence.
    pub async fn generate(
        &self,
        request: &PageRequest<'_>,
    ) -> Result<AcceptedPage, PipelineError> {
        let mut attempts = Vec::new();
        let mut reinforcement: Option<String> = None;
        let mut best = Score::Unavailable;
        let mut reasons: Vec<String> = Vec::new();

        for attempt in 1..=self.max_attempts {
            let panels = self.render_panels(request, reinforcement.as_deref()).await?;

            let Some(environment) = request.environment else {
                return Ok(AcceptedPage {
                    page: request.page,
                    panels,
                    coherence: Score::Unavailable,
                    attempts,
                });
            };

            let urls: Vec<String> = panels.iter().map(|p| p.image_url.clone()).collect();
            let report = self
                .scorer
                .score_page_coherence(&urls, environment, self.threshold)
                .await;
            best = best.best_of(report.overall_coherence);
            attempts.push(PageAttempt {
                attempt,
                coherence: report.overall_coherence,
                passes_threshold: report.passes_threshold,
                failure_reasons: report.failure_reasons.clone(),
                reinforcement: reinforcement.clone(),
            });

            if report.passes_threshold || report.is_unavailable() {
                if report.is_unavailable() {
                    warn!(
                        page = request.page,
                        attempt,
                        "Coherence scorer unavailable, accepting page unvalidated"
                    );
                } else {
                    info!(
                        page = request.page,
                        attempt,
                        score = %report.overall_coherence,
                        threshold = self.threshold,
                        "Page passed coherence check"
                    );
                }
                return Ok(AcceptedPage {
                    page: request.page,
                    panels,
                    coherence: report.overall_coherence,
                    attempts,
                });
            }

            for reason in &report.failure_reasons {
                if !reasons.contains(reason) {
                    reasons.push(reason.clone());
                }
            }

            warn!(
                page = request.page,
                attempt,
                max_attempts = self.max_attempts,
                score = %report.overall_coherence,
                threshold = self.threshold,
                "Page failed coherence check, regenerating all panels"
            );

            if attempt < self.max_attempts {
                reinforcement = Some(environment_reinforcement(
                    environment,
                    &report.failure_reasons,
                ));
            }
        }

        Err(PipelineError::QualityRejected {
            unit: QualityUnit::Page { page: request.page },
            best_score: best,
            threshold: self.threshold,
            attempts: self.max_attempts,
            reasons,
        })
    }

    /// Panels run sequentially; each one continues from the previous image.
    async fn render_panels(
        &self,
        request: &PageRequest<'_>,
        clause: Option<&str>,
    ) -> Result<Vec<AcceptedPanel>, PipelineError> {
        let mut accepted: Vec<AcceptedPanel> = Vec::with_capacity(request.panel_prompts.len());
        for (index, base_prompt) in request.panel_prompts.iter().enumerate() {
            let prompt = with_clause(base_prompt, clause);
            let continuity = accepted.last().map(|p| p.image_url.clone());
            let panel = self
                .panels
                .generate(&PanelRequest {
                    page: request.page,
                    panel: index + 1,
                    prompt: &prompt,
                    style: request.style,
                    continuity_reference: continuity.as_deref(),
                    reference: request.character,
                })
                .await?;
            accepted.push(panel);
        }
        Ok(accepted)
    }
}
