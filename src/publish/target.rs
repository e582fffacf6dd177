//! Publish target resolution
//!
//! Each target field resolves independently: explicit argument, then the
//! project file, then the process-wide default. The first non-empty value
//! wins. A target without a space key is a configuration error.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::{ConfluenceConfig, ProjectConfig, PublishConfig};
use crate::errors::{Error, Result};

/// Per-call target arguments
#[derive(Debug, Clone, Default)]
pub struct TargetOverrides {
    pub space_key: Option<String>,
    pub parent_page_id: Option<String>,
    /// Directory holding the project file to consult
    pub project_dir: Option<PathBuf>,
}

/// Environment-level defaults
#[derive(Debug, Clone, Default)]
pub struct TargetDefaults {
    pub space_key: Option<String>,
    pub parent_page_id: Option<String>,
    pub project_dir: Option<PathBuf>,
}

impl TargetDefaults {
    pub fn from_config(confluence: &ConfluenceConfig, publish: &PublishConfig) -> Self {
        Self {
            space_key: confluence.default_space_key.clone(),
            parent_page_id: confluence.default_parent_page_id.clone(),
            project_dir: publish.project_dir.clone(),
        }
    }
}

/// Where a page will be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTarget {
    pub space_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_page_id: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Locate the project file for this call.
///
/// An explicit directory is authoritative. Otherwise the search walks up from
/// the source document, then falls back to the configured project directory.
async fn project_config(
    overrides: &TargetOverrides,
    source_path: Option<&Path>,
    defaults: &TargetDefaults,
) -> Result<Option<ProjectConfig>> {
    if let Some(dir) = &overrides.project_dir {
        return ProjectConfig::load(dir).await;
    }

    if let Some(start) = source_path.and_then(Path::parent) {
        if let Some((dir, config)) = ProjectConfig::discover(start).await? {
            debug!(dir = %dir.display(), "Found project config near source document");
            return Ok(Some(config));
        }
    }

    match &defaults.project_dir {
        Some(dir) => ProjectConfig::load(dir).await,
        None => Ok(None),
    }
}

pub async fn resolve_target(
    overrides: &TargetOverrides,
    source_path: Option<&Path>,
    defaults: &TargetDefaults,
) -> Result<PublishTarget> {
    let project = project_config(overrides, source_path, defaults).await?.unwrap_or_default();

    let space_key = non_empty(overrides.space_key.as_ref())
        .or_else(|| non_empty(project.space_key.as_ref()))
        .or_else(|| non_empty(defaults.space_key.as_ref()))
        .ok_or_else(|| {
            Error::config(
                "No Confluence space key: pass spaceKey, run configure_project, \
                 or set CONFLUENCE_SPACE_KEY",
            )
        })?;

    let parent_page_id = non_empty(overrides.parent_page_id.as_ref())
        .or_else(|| non_empty(project.parent_page_id.as_ref()))
        .or_else(|| non_empty(defaults.parent_page_id.as_ref()));

    Ok(PublishTarget { space_key, parent_page_id })
}
