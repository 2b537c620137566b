//! Generation capability providers
//!
//! The engine talks to external generation services through two seams:
//! [`GenerationProvider`] (describe, write, draw) and [`QualityScorer`]
//! (panel consistency, page coherence). Providers raise classified
//! [`ProviderError`]s; scorers never fail and report
//! [`Score::Unavailable`](crate::validation::score::Score) instead.

use crate::error::ProviderError;
use crate::validation::score::{CoherenceReport, ConsistencyScore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub mod openai;

pub use openai::{OpenAiProvider, OpenAiScorer};

/// Reference description of a character that panels must stay consistent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDna {
    #[serde(default)]
    pub name: Option<String>,
    pub description: String,
    /// Features a scorer checks explicitly (hair, outfit, markings, ...)
    #[serde(default)]
    pub key_features: Vec<String>,
}

impl CharacterDna {
    pub fn from_description(name: Option<String>, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            key_features: Vec::new(),
        }
    }

    /// One-line summary used inside prompts.
    pub fn summary(&self) -> String {
        let mut out = match &self.name {
            Some(name) => format!("{}: {}", name, self.description),
            None => self.description.clone(),
        };
        if !self.key_features.is_empty() {
            let _ = write!(out, " (key features: {})", self.key_features.join(", "));
        }
        out
    }
}

/// Reference description of the world a page takes place in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDna {
    pub location: String,
    pub lighting: String,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl EnvironmentDna {
    pub fn summary(&self) -> String {
        let mut out = format!("{}, {} lighting", self.location, self.lighting);
        if !self.palette.is_empty() {
            let _ = write!(out, ", palette of {}", self.palette.join(", "));
        }
        if let Some(architecture) = &self.architecture {
            let _ = write!(out, ", {} architecture", architecture);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryParams {
    pub character_description: String,
    pub character_name: Option<String>,
    pub theme: String,
    pub audience: Option<String>,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneImageParams {
    pub prompt: String,
    pub style: String,
    /// Image URL of the previously accepted panel on the same page
    pub continuity_reference: Option<String>,
}

/// Text and image generation capabilities
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Describe the character shown in an image
    async fn describe_character(&self, image_url: &str) -> Result<String, ProviderError>;

    /// Write a story; pages are separated by blank lines
    async fn generate_story(&self, params: &StoryParams) -> Result<String, ProviderError>;

    /// Synthesize one scene image and return its URL
    async fn generate_scene_image(&self, params: &SceneImageParams)
        -> Result<String, ProviderError>;

    fn provider_name(&self) -> &str;
}

/// Automated quality scoring.
///
/// Implementations must not fail: an unreachable or confused scorer
/// returns an unavailable score, which callers accept without gating.
#[async_trait]
pub trait QualityScorer: Send + Sync {
    async fn score_panel_consistency(
        &self,
        image_url: &str,
        reference: &CharacterDna,
        threshold: u8,
    ) -> ConsistencyScore;

    async fn score_page_coherence(
        &self,
        image_urls: &[String],
        environment: &EnvironmentDna,
        threshold: u8,
    ) -> CoherenceReport;
}
