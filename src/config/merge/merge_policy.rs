//! Merge rules: built-in defaults first, every later source overrides.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

use crate::dispatcher::DispatcherConfig;
use crate::validation::ValidationConfig;

/// Create a Config builder with the engine defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let dispatcher = DispatcherConfig::default();
    let validation = ValidationConfig::default();
    Config::builder()
        .set_default("dispatcher.poll_interval_secs", dispatcher.poll_interval_secs)?
        .set_default(
            "dispatcher.max_concurrent_jobs",
            dispatcher.max_concurrent_jobs as u64,
        )?
        .set_default("dispatcher.batch_size", dispatcher.batch_size as u64)?
        .set_default(
            "dispatcher.stale_sweep_interval_secs",
            dispatcher.stale_sweep_interval_secs,
        )?
        .set_default("dispatcher.stale_threshold_secs", dispatcher.stale_threshold_secs)?
        .set_default(
            "validation.max_panel_attempts",
            u64::from(validation.max_panel_attempts),
        )?
        .set_default(
            "validation.max_page_attempts",
            u64::from(validation.max_page_attempts),
        )?
        .set_default("validation.panel_threshold", u64::from(validation.panel_threshold))?
        .set_default("validation.page_threshold", u64::from(validation.page_threshold))
}
