// Configuration management module
// TOML settings, environment credentials and the interactive setup

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV, Config, ConfigError, DEFAULT_PAGES, IndexConfig, OpenAiConfig, WikipediaConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
