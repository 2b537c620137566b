//! Workspace config files: config/storyforge.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

pub const CONFIG_DIR: &str = "config";
pub const BASE_FILE: &str = "storyforge.toml";

/// Add workspace config files to builder.
/// Precedence: config/storyforge.toml (base) then config/{STORYFORGE_ENV}.toml.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join(CONFIG_DIR);
    let mut builder = builder;

    let base_config_path = config_dir.join(BASE_FILE);
    if base_config_path.exists() {
        builder = builder.add_source(File::from(base_config_path.as_path()).required(false));
    }

    if let Ok(env_name) = std::env::var("STORYFORGE_ENV") {
        let env_config_path = config_dir.join(format!("{}.toml", env_name));
        if env_config_path.exists() {
            builder = builder.add_source(File::from(env_config_path.as_path()).required(false));
        }
    }

    Ok(builder)
}
