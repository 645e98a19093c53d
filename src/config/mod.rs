//! Configuration management for the honeypot guard.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `HONEYPOT__SECTION__KEY` environment variables.

use std::env;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use crate::models::Config;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());
    build_config(Some(&config_file), true)
}

fn build_config(config_file: Option<&str>, with_env: bool) -> Result<Config, ConfigError> {
    // Built-in defaults come from `Config::default()` so they live in one place.
    let defaults = ConfigBuilder::try_from(&Config::default())?;
    let mut builder = ConfigBuilder::builder().add_source(defaults);

    if let Some(path) = config_file {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    if with_env {
        builder = builder.add_source(
            Environment::with_prefix("HONEYPOT")
                .separator("__")
                .try_parsing(true),
        );
    }

    builder.build()?.try_deserialize()
}
