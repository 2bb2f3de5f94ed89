//! JSON file store for the `state` command.
//!
//! One pretty-printed `StoreRecord` per file, merged on every write the way
//! `storage.local.set` merges keys.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use sw_core::store::{Store, StoreError, StoreKey, StoreRecord};

/// JSON file standing in for `storage.local`. A missing file is an empty
/// store.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<StoreRecord, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreRecord::default()),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn save(&self, record: &StoreRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("Failed to create '{}': {}", parent.display(), e)))?;
            }
        }
        let text = serde_json::to_string_pretty(record).map_err(|e| StoreError::Malformed(e.to_string()))?;
        fs::write(&self.path, text)
            .map_err(|e| StoreError::Backend(format!("Failed to write '{}': {}", self.path.display(), e)))
    }
}

impl Store for FileStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError> {
        Ok(self.load()?.project(keys))
    }

    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError> {
        // Last write wins; a malformed file is replaced
        let mut current = self.load().unwrap_or_default();
        let changes = current.merge(record);
        if changes.is_empty() && self.path.exists() {
            return Ok(());
        }
        for change in &changes {
            log::debug!("store change: {:?}", change);
        }
        self.save(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sw-cli-test-{}", std::process::id()));
        dir.join(name)
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let store = FileStore::new(temp_path("missing.json"));
        let record = store.get(&StoreKey::ALL).await.unwrap();
        assert_eq!(record, StoreRecord::default());
    }

    #[tokio::test]
    async fn writes_merge_into_file() {
        let path = temp_path("merge.json");
        let _ = fs::remove_file(&path);
        let store = FileStore::new(&path);

        store.set(&StoreRecord::install_defaults()).await.unwrap();
        store.set(&StoreRecord::blocked_count(5)).await.unwrap();

        let record = store.get(&StoreKey::ALL).await.unwrap();
        assert_eq!(record.enabled, Some(true));
        assert_eq!(record.blocked_count, Some(5));
        assert_eq!(record.whitelist, Some(Vec::new()));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"blockedCount\": 5"));
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn malformed_file_is_a_read_error() {
        let path = temp_path("broken.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(store.get(&[StoreKey::Enabled]).await, Err(StoreError::Malformed(_))));
        let _ = fs::remove_file(&path);
    }
}
