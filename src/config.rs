//! Configuration System
//!
//! Layered engine configuration: built-in defaults, then a TOML file
//! (explicit path, or `config/storyforge.toml` in the workspace), then
//! `STORYFORGE__SECTION__KEY` environment variables.

use crate::dispatcher::DispatcherConfig;
use crate::error::EngineError;
use crate::logging::LoggingConfig;
use crate::provider::openai::OpenAiConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge;
mod sources;

use merge::merge_policy;

const FALLBACK_STORE_PATH: &str = ".storyforge/jobs";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    /// OpenAI-compatible generation and scoring endpoint
    #[serde(default)]
    pub provider: OpenAiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Job store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sled database directory; defaults to the platform data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// `max_retries` for newly enqueued jobs
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_max_retries: default_max_retries(),
        }
    }
}

impl StoreConfig {
    /// Configured path, else `<data dir>/jobs`, else `.storyforge/jobs`.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        directories::ProjectDirs::from("dev", "storyforge", "storyforge")
            .map(|dirs| dirs.data_dir().join("jobs"))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_STORE_PATH))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Dispatcher(String),
    Validation(String),
    Provider(String),
    Store(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Dispatcher(msg) => write!(f, "dispatcher: {}", msg),
            ValidationError::Validation(msg) => write!(f, "validation: {}", msg),
            ValidationError::Provider(msg) => write!(f, "provider: {}", msg),
            ValidationError::Store(msg) => write!(f, "store: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(problems) = self.dispatcher.validate() {
            errors.extend(problems.into_iter().map(ValidationError::Dispatcher));
        }
        if let Err(problems) = self.validation.validate() {
            errors.extend(problems.into_iter().map(ValidationError::Validation));
        }
        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Some(path) = &self.store.path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Store("path cannot be empty".to_string()));
            }
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Loads [`EngineConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with workspace discovery rooted at the current directory.
    pub fn load(explicit: Option<&Path>) -> Result<EngineConfig, EngineError> {
        let workspace_root = std::env::current_dir().map_err(|e| {
            EngineError::ConfigError(format!("Cannot read working directory: {}", e))
        })?;
        Self::load_from(&workspace_root, explicit)
    }

    /// Defaults, then `explicit` (or the workspace files), then environment.
    pub fn load_from(
        workspace_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<EngineConfig, EngineError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = match explicit {
            Some(path) => sources::explicit_file::add_to_builder(builder, path)?,
            None => sources::workspace_file::add_to_builder(builder, workspace_root)?,
        };
        builder = sources::environment::add_to_builder(builder);

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load a single file on top of the defaults, without environment overrides.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, EngineError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = sources::explicit_file::add_to_builder(builder, path)?;
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load and validate, folding validation problems into one error.
    pub fn load_validated(explicit: Option<&Path>) -> Result<EngineConfig, EngineError> {
        let config = Self::load(explicit)?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
