mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Prefix for environment overrides, e.g. `GATEWAY_ENVIRONMENT=production`
/// or `GATEWAY_PROXY__TIMEOUT_SECS=30`.
pub const ENV_PREFIX: &str = "GATEWAY";

/// Load configuration from built-in defaults, an optional file (YAML, JSON
/// or TOML by extension) and `GATEWAY_*` environment variables, in that
/// order of precedence.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    load_with_env(path, environment_source())
}

fn environment_source() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_with_env(path: Option<&Path>, env: ::config::Environment) -> Result<Config> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(env)
        .build()
        .context("Failed to read configuration")?;

    let config: Config = settings
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
