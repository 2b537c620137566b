//! Typed job kinds.
//!
//! The store keeps `type` and `input_data` opaque; the router decodes them
//! into a [`JobSpec`] once and matches exhaustively from there on.

use crate::error::PipelineError;
use crate::provider::{CharacterDna, EnvironmentDna};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Storybook,
    AutoStory,
    Scenes,
    Cartoonize,
    ImageGeneration,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Storybook,
        JobKind::AutoStory,
        JobKind::Scenes,
        JobKind::Cartoonize,
        JobKind::ImageGeneration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Storybook => "storybook",
            JobKind::AutoStory => "auto-story",
            JobKind::Scenes => "scenes",
            JobKind::Cartoonize => "cartoonize",
            JobKind::ImageGeneration => "image-generation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PipelineError::UnsupportedJobType(s.to_string()))
    }
}

fn default_style() -> String {
    "storybook illustration".to_string()
}

fn default_page_count() -> usize {
    4
}

fn default_panels_per_page() -> usize {
    1
}

fn default_count() -> usize {
    1
}

/// One page of a pre-written storybook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScript {
    pub text: String,
    /// Scene prompts, one per panel. Empty means one panel drawn from `text`.
    #[serde(default)]
    pub panels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorybookInput {
    pub title: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub character: Option<CharacterDna>,
    #[serde(default)]
    pub environment: Option<EnvironmentDna>,
    pub pages: Vec<PageScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoStoryInput {
    pub character_image_url: String,
    #[serde(default)]
    pub character_name: Option<String>,
    pub theme: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_page_count")]
    pub page_count: usize,
    #[serde(default = "default_panels_per_page")]
    pub panels_per_page: usize,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub environment: Option<EnvironmentDna>,
    /// Use the generated character description as the consistency reference
    #[serde(default)]
    pub validate_consistency: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenesInput {
    #[serde(default)]
    pub story: Option<String>,
    pub scenes: Vec<String>,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub character: Option<CharacterDna>,
    #[serde(default)]
    pub environment: Option<EnvironmentDna>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartoonizeInput {
    pub image_url: String,
    #[serde(default = "default_style")]
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationInput {
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub character: Option<CharacterDna>,
}

/// A decoded job: kind plus its strongly-typed input
#[derive(Debug, Clone, PartialEq)]
pub enum JobSpec {
    Storybook(StorybookInput),
    AutoStory(AutoStoryInput),
    Scenes(ScenesInput),
    Cartoonize(CartoonizeInput),
    ImageGeneration(ImageGenerationInput),
}

impl JobSpec {
    /// Decode a store record's type tag and payload.
    pub fn decode(job_type: &str, input: &Value) -> Result<Self, PipelineError> {
        let kind: JobKind = job_type.parse()?;
        let spec = match kind {
            JobKind::Storybook => JobSpec::Storybook(parse_input(kind, input)?),
            JobKind::AutoStory => JobSpec::AutoStory(parse_input(kind, input)?),
            JobKind::Scenes => JobSpec::Scenes(parse_input(kind, input)?),
            JobKind::Cartoonize => JobSpec::Cartoonize(parse_input(kind, input)?),
            JobKind::ImageGeneration => JobSpec::ImageGeneration(parse_input(kind, input)?),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Storybook(_) => JobKind::Storybook,
            JobSpec::AutoStory(_) => JobKind::AutoStory,
            JobSpec::Scenes(_) => JobKind::Scenes,
            JobSpec::Cartoonize(_) => JobKind::Cartoonize,
            JobSpec::ImageGeneration(_) => JobKind::ImageGeneration,
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let problem = match self {
            JobSpec::Storybook(input) if input.pages.is_empty() => Some("storybook has no pages"),
            JobSpec::AutoStory(input) if input.page_count == 0 => Some("page_count must be > 0"),
            JobSpec::AutoStory(input) if input.panels_per_page == 0 => {
                Some("panels_per_page must be > 0")
            }
            JobSpec::AutoStory(input) if input.character_image_url.trim().is_empty() => {
                Some("character_image_url is empty")
            }
            JobSpec::Scenes(input) if input.scenes.is_empty() => Some("no scenes to illustrate"),
            JobSpec::Cartoonize(input) if input.image_url.trim().is_empty() => {
                Some("image_url is empty")
            }
            JobSpec::ImageGeneration(input) if input.prompt.trim().is_empty() => {
                Some("prompt is empty")
            }
            JobSpec::ImageGeneration(input) if input.count == 0 => Some("count must be > 0"),
            _ => None,
        };
        match problem {
            Some(msg) => Err(PipelineError::InvalidInput(format!("{}: {}", self.kind(), msg))),
            None => Ok(()),
        }
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(
    kind: JobKind,
    input: &Value,
) -> Result<T, PipelineError> {
    T::deserialize(input)
        .map_err(|e| PipelineError::InvalidInput(format!("{} input: {}", kind, e)))
}
