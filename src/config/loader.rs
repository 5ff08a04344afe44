//! Load the servers config and the blocklist document from disk.

use crate::blockfile::BlockFile;
use crate::config::{validate, ApplyConfig};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load and validate the servers config. JSON files are accepted, being valid YAML.
pub async fn load_config(path: impl AsRef<Path>) -> Result<ApplyConfig, ConfigError> {
    let config: ApplyConfig = load_file(path.as_ref()).await?;
    validate(&config)?;
    Ok(config)
}

/// Load an already-verified blocklist document.
pub async fn load_block_file(path: impl AsRef<Path>) -> Result<BlockFile, ConfigError> {
    load_file(path.as_ref()).await
}

async fn load_file<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let shown = path.display().to_string();
    tracing::debug!(path = %shown, "load");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io {
            path: shown.clone(),
            source: e,
        })?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: shown,
        source: e,
    })
}
