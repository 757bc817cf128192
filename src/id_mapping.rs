use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MigrateError, Result};

/// Source user id to target user id, persisted across runs.
///
/// Entries are only ever added. A source id that was mapped in an earlier run
/// keeps its target id, so re-running a wave never mints a second identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMapping {
    entries: BTreeMap<String, String>,
}

impl IdMapping {
    /// Loads the mapping at `path`. A missing file is an empty mapping.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No ID mapping yet");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let mapping: Self = serde_json::from_str(&text)
            .map_err(|e| MigrateError::Mapping(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), entries = mapping.len(), "Loaded ID mapping");
        Ok(mapping)
    }

    /// The mapped target id, or a fresh one when the source id is new.
    pub fn target_id_for(&self, source_id: &str) -> String {
        self.get(source_id)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    /// Adds `source_id -> target_id` unless the source id is already mapped.
    /// Returns whether an entry was added.
    pub fn record(&mut self, source_id: &str, target_id: &str) -> bool {
        match self.entries.get(source_id) {
            Some(existing) if existing == target_id => false,
            Some(existing) => {
                tracing::warn!(
                    source_id,
                    mapped = %existing,
                    resolved = target_id,
                    "ID mapping disagrees with target, keeping mapped id"
                );
                false
            }
            None => {
                self.entries
                    .insert(source_id.to_string(), target_id.to_string());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers
    /// never see a partial mapping.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::Mapping(e.to_string()))?;

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = IdMapping::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(mapping.is_empty());
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("user-id-mapping.json");

        let mut mapping = IdMapping::default();
        assert!(mapping.record("src-1", "tgt-1"));
        assert!(mapping.record("src-2", "tgt-2"));
        mapping.save(&path).await.unwrap();

        let reloaded = IdMapping::load(&path).await.unwrap();
        assert_eq!(reloaded, mapping);
        assert_eq!(reloaded.get("src-1"), Some("tgt-1"));
        assert!(!temp_path(&path).exists());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["src-2"], "tgt-2");
    }

    #[test]
    fn existing_entries_are_never_replaced() {
        let mut mapping = IdMapping::default();
        mapping.record("src-1", "tgt-1");
        assert!(!mapping.record("src-1", "tgt-other"));
        assert_eq!(mapping.get("src-1"), Some("tgt-1"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn mapped_ids_are_reused() {
        let mut mapping = IdMapping::default();
        mapping.record("src-1", "tgt-1");
        assert_eq!(mapping.target_id_for("src-1"), "tgt-1");

        let fresh = mapping.target_id_for("src-2");
        assert!(Uuid::parse_str(&fresh).is_ok());
        assert_ne!(fresh, mapping.target_id_for("src-2"));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_mapping_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user-id-mapping.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            IdMapping::load(&path).await,
            Err(MigrateError::Mapping(_))
        ));
    }
}
