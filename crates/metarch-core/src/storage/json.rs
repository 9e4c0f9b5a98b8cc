//! JSON file registry store
//!
//! One pretty-printed document mapping worker id to record. Writes go to a
//! sibling temp file first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::RegistryStore;
use crate::error::{Error, Result};
use crate::routing::WorkerRecord;

#[derive(Debug, Clone)]
pub struct JsonRegistryStore {
    path: PathBuf,
}

impl JsonRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for JsonRegistryStore {
    async fn load_all(&self) -> Result<Vec<WorkerRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No registry file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: BTreeMap<String, WorkerRecord> = serde_json::from_str(&content)?;
        let mut records = Vec::with_capacity(document.len());
        for (key, record) in document {
            if key != record.descriptor.id {
                return Err(Error::RegistryCorrupted(format!(
                    "entry '{}' holds worker '{}'",
                    key, record.descriptor.id
                )));
            }
            records.push(record);
        }

        info!(count = records.len(), path = %self.path.display(), "Loaded workers from file");
        Ok(records)
    }

    async fn save_all(&self, records: &[WorkerRecord]) -> Result<()> {
        let document: BTreeMap<&str, &WorkerRecord> = records
            .iter()
            .map(|r| (r.descriptor.id.as_str(), r))
            .collect();
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        info!(count = records.len(), path = %self.path.display(), "Saved workers to file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::routing::{CapabilityDescriptor, ComplexityRange, Outcome};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonRegistryStore::new(dir.path().join("registry.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_keyed_by_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("registry.json");
        let store = JsonRegistryStore::new(&path);

        let mut record = WorkerRecord::new(
            CapabilityDescriptor::new("Web", ["web"], ComplexityRange::full())
                .with_id("web-desk")
                .with_prompt_template("You build accessible pages."),
        );
        record.stats.apply(&Outcome::success(Duration::from_millis(40)), 0.2);

        store.save_all(&[record.clone()]).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("web-desk").is_some());
        assert!(!store.temp_path().exists());

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[tokio::test]
    async fn test_mismatched_key_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let record = WorkerRecord::new(
            CapabilityDescriptor::new("Web", ["web"], ComplexityRange::full()).with_id("web-desk"),
        );
        let document = serde_json::json!({ "other-id": record });
        std::fs::write(&path, document.to_string()).unwrap();

        let err = JsonRegistryStore::new(&path).load_all().await.unwrap_err();
        assert!(matches!(err, Error::RegistryCorrupted(_)));
    }
}
