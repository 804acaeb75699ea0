use std::path::{Path, PathBuf};

use crate::sink::remote::{DEFAULT_CHUNK_SIZE, DEFAULT_PREFIX};

pub const DEFAULT_CONFIG_FILE: &str = "scene-inspector.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runtime settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Directory relative local saves resolve against.
    pub export_dir: PathBuf,
    /// Root of the directory-backed remote store.
    pub remote_root: PathBuf,
    pub remote_prefix: String,
    pub upload_chunk_size: usize,
    /// Default env_logger filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("."),
            remote_root: PathBuf::from("remote_store"),
            remote_prefix: DEFAULT_PREFIX.to_string(),
            upload_chunk_size: DEFAULT_CHUNK_SIZE,
            log_filter: "info".to_string(),
        }
    }
}

impl InspectorConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }
}
