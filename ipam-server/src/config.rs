//! Configuration management

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use ipam_common::ServerConfig;

/// Environment variable prefix, e.g. `IPAM__DATABASE__URL`
const ENV_PREFIX: &str = "IPAM";

/// Load configuration from an optional TOML file, then the environment
///
/// A missing file is not an error; defaults fill whatever neither source sets.
pub fn load_config(config_path: &str) -> Result<ServerConfig> {
    let settings = Config::builder()
        .add_source(File::new(config_path, FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    settings
        .try_deserialize::<ServerConfig>()
        .with_context(|| format!("Failed to parse config file: {}", config_path))
}
