//! Stage sequences for each job kind.
//!
//! Every sequence is strictly sequential: a stage starts only after the
//! previous stage's progress update has been written.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::{PipelineError, ProviderError};
use crate::job::kind::{
    AutoStoryInput, CartoonizeInput, ImageGenerationInput, ScenesInput, StorybookInput,
};
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::story::{panel_prompts, split_pages};
use crate::provider::{CharacterDna, GenerationProvider, StoryParams};
use crate::validation::{AcceptedPage, AcceptedPanel, PageRequest, PageValidator, PanelRequest};

#[derive(Debug, Clone, Serialize)]
pub struct PageOutput {
    pub page: usize,
    pub text: String,
    pub image_urls: Vec<String>,
}

/// Validation history stored under `result_data.validation`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub panel_threshold: u8,
    pub page_threshold: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<AcceptedPage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub panels: Vec<AcceptedPanel>,
}

#[derive(Debug, Serialize)]
struct StorybookResult {
    title: String,
    pages: Vec<PageOutput>,
    validation: ValidationReport,
}

#[derive(Debug, Serialize)]
struct AutoStoryResult {
    character_description: String,
    story: String,
    pages: Vec<PageOutput>,
    validation: ValidationReport,
}

#[derive(Debug, Serialize)]
struct ScenesResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    story: Option<String>,
    image_urls: Vec<String>,
    validation: ValidationReport,
}

#[derive(Debug, Serialize)]
struct CartoonizeResult {
    source_image_url: String,
    description: String,
    image_url: String,
    validation: ValidationReport,
}

#[derive(Debug, Serialize)]
struct ImageGenerationResult {
    image_urls: Vec<String>,
    validation: ValidationReport,
}

pub struct Stages {
    generator: Arc<dyn GenerationProvider>,
    pages: PageValidator,
}

impl Stages {
    pub fn new(generator: Arc<dyn GenerationProvider>, pages: PageValidator) -> Self {
        Self { generator, pages }
    }

    fn report(&self) -> ValidationReport {
        ValidationReport {
            panel_threshold: self.pages.panels().threshold(),
            page_threshold: self.pages.threshold(),
            pages: Vec::new(),
            panels: Vec::new(),
        }
    }

    /// Pre-written pages: illustrate each one through the page loop.
    pub async fn storybook(
        &self,
        input: &StorybookInput,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        progress.checkpoint(10, "Illustrating storybook pages").await?;

        let total = input.pages.len();
        let mut outputs = Vec::with_capacity(total);
        let mut report = self.report();
        for (index, script) in input.pages.iter().enumerate() {
            let prompts = if script.panels.is_empty() {
                vec![script.text.clone()]
            } else {
                script.panels.clone()
            };
            let page = self
                .pages
                .generate(&PageRequest {
                    page: index + 1,
                    panel_prompts: &prompts,
                    style: &input.style,
                    character: input.character.as_ref(),
                    environment: input.environment.as_ref(),
                })
                .await?;
            outputs.push(PageOutput {
                page: index + 1,
                text: script.text.clone(),
                image_urls: page.image_urls(),
            });
            report.pages.push(page);
            progress
                .checkpoint_fraction(
                    10,
                    95,
                    index + 1,
                    total,
                    &format!("Illustrated page {} of {}", index + 1, total),
                )
                .await?;
        }

        to_value(&StorybookResult {
            title: input.title.clone(),
            pages: outputs,
            validation: report,
        })
    }

    /// Describe the character, write a story about them, then illustrate it.
    pub async fn auto_story(
        &self,
        input: &AutoStoryInput,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        let description = self
            .generator
            .describe_character(&input.character_image_url)
            .await?;
        progress.checkpoint(10, "Character described").await?;

        let story = self
            .generator
            .generate_story(&StoryParams {
                character_description: description.clone(),
                character_name: input.character_name.clone(),
                theme: input.theme.clone(),
                audience: input.audience.clone(),
                page_count: input.page_count,
            })
            .await?;
        progress.checkpoint(30, "Story written").await?;

        let page_texts = split_pages(&story, input.page_count);
        if page_texts.is_empty() {
            return Err(ProviderError::unknown("generated story contained no text").into());
        }

        let reference = input
            .validate_consistency
            .then(|| CharacterDna::from_description(input.character_name.clone(), &description));

        let total = page_texts.len();
        let mut outputs = Vec::with_capacity(total);
        let mut report = self.report();
        for (index, text) in page_texts.iter().enumerate() {
            let prompts = panel_prompts(text, input.panels_per_page);
            let page = self
                .pages
                .generate(&PageRequest {
                    page: index + 1,
                    panel_prompts: &prompts,
                    style: &input.style,
                    character: reference.as_ref(),
                    environment: input.environment.as_ref(),
                })
                .await?;
            outputs.push(PageOutput {
                page: index + 1,
                text: text.clone(),
                image_urls: page.image_urls(),
            });
            report.pages.push(page);
            progress
                .checkpoint_fraction(
                    30,
                    75,
                    index + 1,
                    total,
                    &format!("Illustrated page {} of {}", index + 1, total),
                )
                .await?;
        }

        progress.checkpoint(75, "Assembling storybook").await?;
        info!(job_id = %progress.job_id(), pages = total, "Auto story assembled");

        to_value(&AutoStoryResult {
            character_description: description,
            story,
            pages: outputs,
            validation: report,
        })
    }

    /// Scenes are illustrated as a single page.
    pub async fn scenes(
        &self,
        input: &ScenesInput,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        progress
            .checkpoint(10, &format!("Illustrating {} scenes", input.scenes.len()))
            .await?;

        let page = self
            .pages
            .generate(&PageRequest {
                page: 1,
                panel_prompts: &input.scenes,
                style: &input.style,
                character: input.character.as_ref(),
                environment: input.environment.as_ref(),
            })
            .await?;
        progress.checkpoint(90, "Scenes illustrated").await?;

        let mut report = self.report();
        let image_urls = page.image_urls();
        report.pages.push(page);
        to_value(&ScenesResult {
            story: input.story.clone(),
            image_urls,
            validation: report,
        })
    }

    /// Describe the source image and redraw it, gated on the description.
    pub async fn cartoonize(
        &self,
        input: &CartoonizeInput,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        let description = self.generator.describe_character(&input.image_url).await?;
        progress.checkpoint(30, "Source image described").await?;

        let reference = CharacterDna::from_description(None, &description);
        let prompt = format!("A cartoon illustration of {}", description);
        let panel = self
            .pages
            .panels()
            .generate(&PanelRequest {
                page: 1,
                panel: 1,
                prompt: &prompt,
                style: &input.style,
                continuity_reference: None,
                reference: Some(&reference),
            })
            .await?;
        progress.checkpoint(90, "Cartoon generated").await?;

        let mut report = self.report();
        let image_url = panel.image_url.clone();
        report.panels.push(panel);
        to_value(&CartoonizeResult {
            source_image_url: input.image_url.clone(),
            description,
            image_url,
            validation: report,
        })
    }

    /// `count` independent images from one prompt.
    pub async fn image_generation(
        &self,
        input: &ImageGenerationInput,
        progress: &mut ProgressReporter,
    ) -> Result<Value, PipelineError> {
        progress.checkpoint(10, "Generating images").await?;

        let mut report = self.report();
        let mut image_urls = Vec::with_capacity(input.count);
        for index in 0..input.count {
            let panel = self
                .pages
                .panels()
                .generate(&PanelRequest {
                    page: 1,
                    panel: index + 1,
                    prompt: &input.prompt,
                    style: &input.style,
                    continuity_reference: None,
                    reference: input.character.as_ref(),
                })
                .await?;
            image_urls.push(panel.image_url.clone());
            report.panels.push(panel);
            progress
                .checkpoint_fraction(
                    10,
                    95,
                    index + 1,
                    input.count,
                    &format!("Generated image {} of {}", index + 1, input.count),
                )
                .await?;
        }

        to_value(&ImageGenerationResult {
            image_urls,
            validation: report,
        })
    }
}

fn to_value<T: Serialize>(result: &T) -> Result<Value, PipelineError> {
    serde_json::to_value(result)
        .map_err(|e| PipelineError::InvalidInput(format!("result is not serializable: {}", e)))
}
