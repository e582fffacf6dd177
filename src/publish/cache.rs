//! Local path → page mapping cache
//!
//! Correlates local source documents with the Confluence pages they were
//! published to. Held in memory behind a mutex and written through to a JSON
//! file after every change.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{Error, Result};

/// One published document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMapping {
    pub source_path: String,
    pub page_id: String,
    pub space_key: String,
    pub title: String,
    /// Remote version observed after the last successful write
    pub version: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    mappings: Vec<PageMapping>,
}

/// Thread-safe mapping cache with optional file persistence
pub struct PageCache {
    entries: Mutex<HashMap<String, PageMapping>>,
    path: Option<PathBuf>,
}

impl PageCache {
    /// Cache that lives only in memory
    pub fn ephemeral() -> Self {
        Self { entries: Mutex::new(HashMap::new()), path: None }
    }

    /// Load the cache file at `path`; a missing file yields an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<CacheFile>(&raw).map_err(|e| {
                Error::config(format!("Invalid page cache {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => return Err(Error::io(e, format!("reading {}", path.display()))),
        };

        let entries: HashMap<String, PageMapping> = file
            .mappings
            .into_iter()
            .map(|mut m| {
                m.source_path = normalize_key(&m.source_path);
                (m.source_path.clone(), m)
            })
            .collect();
        info!(path = %path.display(), mappings = entries.len(), "Loaded page cache");

        Ok(Self { entries: Mutex::new(entries), path: Some(path) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self, source_path: &str) -> Option<PageMapping> {
        self.entries.lock().await.get(&normalize_key(source_path)).cloned()
    }

    /// Insert or replace the mapping for `mapping.source_path`
    pub async fn upsert(&self, mut mapping: PageMapping) -> Result<()> {
        mapping.source_path = normalize_key(&mapping.source_path);
        let mut entries = self.entries.lock().await;
        debug!(
            source_path = %mapping.source_path,
            page_id = %mapping.page_id,
            "Upserting mapping"
        );
        entries.insert(mapping.source_path.clone(), mapping);
        self.persist(&entries).await
    }

    pub async fn remove(&self, source_path: &str) -> Result<Option<PageMapping>> {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(&normalize_key(source_path));
        if removed.is_some() {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    /// Remove every mapping pointing at `page_id`. Linear in cache size.
    pub async fn remove_by_page_id(&self, page_id: &str) -> Result<Vec<PageMapping>> {
        let mut entries = self.entries.lock().await;
        let keys: Vec<String> = entries
            .iter()
            .filter(|(_, m)| m.page_id == page_id)
            .map(|(k, _)| k.clone())
            .collect();

        let removed: Vec<PageMapping> = keys.iter().filter_map(|k| entries.remove(k)).collect();
        if !removed.is_empty() {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    pub async fn find_by_page_id(&self, page_id: &str) -> Option<PageMapping> {
        self.entries.lock().await.values().find(|m| m.page_id == page_id).cloned()
    }

    /// All mappings ordered by source path
    pub async fn list(&self) -> Vec<PageMapping> {
        let mut mappings: Vec<PageMapping> =
            self.entries.lock().await.values().cloned().collect();
        mappings.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        mappings
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the whole table to a sibling temp file, then rename over the cache file.
    async fn persist(&self, entries: &HashMap<String, PageMapping>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut mappings: Vec<PageMapping> = entries.values().cloned().collect();
        mappings.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        let raw = serde_json::to_vec_pretty(&CacheFile { mappings })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, format!("creating {}", parent.display())))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| Error::io(e, format!("writing {}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::io(e, format!("replacing {}", path.display())))?;
        Ok(())
    }
}

/// Lexically normalize a source path so `./docs/a.md` and `docs/a.md` share a key.
pub fn normalize_key(source_path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;

    for component in Path::new(source_path.trim()).components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().map(|p| p != "..").unwrap_or(false) {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(path: &str, page_id: &str) -> PageMapping {
        PageMapping {
            source_path: path.to_string(),
            page_id: page_id.to_string(),
            space_key: "ENG".to_string(),
            title: "Guide".to_string(),
            version: 1,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(normalize_key("./docs/guide.md"), "docs/guide.md");
        assert_eq!(normalize_key("docs//drafts/../guide.md"), "docs/guide.md");
        assert_eq!(normalize_key("/srv/docs/./a.md"), "/srv/docs/a.md");
        assert_eq!(normalize_key("../a.md"), "../a.md");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_mapping() {
        let cache = PageCache::ephemeral();
        cache.upsert(mapping("docs/guide.md", "1")).await.unwrap();
        let mut second = mapping("./docs/guide.md", "1");
        second.version = 2;
        cache.upsert(second).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("docs/guide.md").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn remove_by_page_id_scans_all_entries() {
        let cache = PageCache::ephemeral();
        cache.upsert(mapping("a.md", "1")).await.unwrap();
        cache.upsert(mapping("b.md", "2")).await.unwrap();

        let removed = cache.remove_by_page_id("2").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].source_path, "b.md");
        assert!(cache.find_by_page_id("2").await.is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn persisted_cache_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/page-cache.json");

        let cache = PageCache::load(&path).await.unwrap();
        assert!(cache.is_empty().await);
        cache.upsert(mapping("docs/a.md", "10")).await.unwrap();
        cache.upsert(mapping("docs/b.md", "11")).await.unwrap();
        cache.remove("docs/a.md").await.unwrap();

        let reloaded = PageCache::load(&path).await.unwrap();
        let all = reloaded.list().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].page_id, "11");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(PageCache::load(&path).await, Err(Error::Config(_))));
    }
}
