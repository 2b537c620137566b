//! Validation & regeneration engine
//!
//! Wraps generated visual output in quality gates: a panel loop scoring
//! character consistency and a page loop scoring environmental coherence,
//! both with bounded attempt budgets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::{GenerationProvider, QualityScorer};

pub mod page;
pub mod panel;
pub mod prompt;
pub mod score;

pub use page::{AcceptedPage, PageAttempt, PageRequest, PageValidator};
pub use panel::{AcceptedPanel, PanelAttempt, PanelRequest, PanelValidator};
pub use score::{CoherenceReport, ConsistencyScore, Score};

pub const MAX_PANEL_ATTEMPTS: u32 = 3;
pub const MAX_PAGE_ATTEMPTS: u32 = 2;
pub const DEFAULT_PANEL_THRESHOLD: u8 = 70;
pub const DEFAULT_PAGE_THRESHOLD: u8 = 70;

/// `[validation]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_panel_attempts")]
    pub max_panel_attempts: u32,
    #[serde(default = "default_max_page_attempts")]
    pub max_page_attempts: u32,
    /// Minimum character consistency score (0-100)
    #[serde(default = "default_panel_threshold")]
    pub panel_threshold: u8,
    /// Minimum page coherence score (0-100)
    #[serde(default = "default_page_threshold")]
    pub page_threshold: u8,
}

fn default_max_panel_attempts() -> u32 {
    MAX_PANEL_ATTEMPTS
}

fn default_max_page_attempts() -> u32 {
    MAX_PAGE_ATTEMPTS
}

fn default_panel_threshold() -> u8 {
    DEFAULT_PANEL_THRESHOLD
}

fn default_page_threshold() -> u8 {
    DEFAULT_PAGE_THRESHOLD
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_panel_attempts: MAX_PANEL_ATTEMPTS,
            max_page_attempts: MAX_PAGE_ATTEMPTS,
            panel_threshold: DEFAULT_PANEL_THRESHOLD,
            page_threshold: DEFAULT_PAGE_THRESHOLD,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.max_panel_attempts == 0 {
            errors.push("max_panel_attempts must be > 0".to_string());
        }
        if self.max_page_attempts == 0 {
            errors.push("max_page_attempts must be > 0".to_string());
        }
        if self.panel_threshold > 100 {
            errors.push(format!("panel_threshold {} is above 100", self.panel_threshold));
        }
        if self.page_threshold > 100 {
            errors.push(format!("page_threshold {} is above 100", self.page_threshold));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Assemble the nested page/panel validators for one provider pair.
    pub fn build(
        &self,
        generator: Arc<dyn GenerationProvider>,
        scorer: Arc<dyn QualityScorer>,
    ) -> PageValidator {
        let panels = PanelValidator::new(
            generator,
            scorer.clone(),
            self.max_panel_attempts,
            self.panel_threshold,
        );
        PageValidator::new(panels, scorer, self.max_page_attempts, self.page_threshold)
    }
}
