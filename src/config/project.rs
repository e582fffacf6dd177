//! Project-level publish defaults stored in `.pageplane.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};

pub const PROJECT_FILE_NAME: &str = ".pageplane.toml";

/// Per-project target defaults, consulted after explicit tool arguments and
/// before the environment defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page_id: Option<String>,
}

impl ProjectConfig {
    /// Load the project file from `dir`, returning `None` when it does not exist.
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(PROJECT_FILE_NAME);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, format!("reading {}", path.display()))),
        };

        let config: ProjectConfig = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("Invalid {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded project config");
        Ok(Some(config))
    }

    /// Walk up from `start` until a directory holding the project file is found.
    pub async fn discover(start: &Path) -> Result<Option<(PathBuf, Self)>> {
        for dir in start.ancestors() {
            if let Some(config) = Self::load(dir).await? {
                return Ok(Some((dir.to_path_buf(), config)));
            }
        }
        Ok(None)
    }

    /// Write the project file into `dir`, replacing any existing one.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(PROJECT_FILE_NAME);
        let raw = toml::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to encode project config: {}", e)))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| Error::io(e, format!("writing {}", path.display())))?;
        Ok(path)
    }
}
