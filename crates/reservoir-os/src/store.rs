use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use reservoir::error::Result as EngineResult;
use reservoir::store::KeyValueStore;

use crate::error::Result;

type Namespaces = BTreeMap<String, BTreeMap<String, String>>;

/// A [`KeyValueStore`] persisted as a JSON document.
///
/// The whole document is rewritten on every change, through a temporary
/// file renamed over the previous one, so a crash never leaves a truncated
/// document behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    namespaces: Namespaces,
}

impl FileStore {
    /// Opens the store at `path`, creating an empty one if the file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let namespaces = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Namespaces::new()
        };

        Ok(Self { path, namespaces })
    }

    /// Returns the path of the store document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let document = serde_json::to_string_pretty(&self.namespaces)?;

        let temporary = self.path.with_extension("tmp");
        fs::write(&temporary, document)?;
        fs::rename(&temporary, &self.path)?;

        debug!("Store written to {}", self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&mut self, namespace: &str, key: &str) -> EngineResult<Option<String>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(&mut self, namespace: &str, key: &str, value: &str) -> EngineResult<()> {
        let _ = self
            .namespaces
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        self.persist().map_err(Into::into)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> EngineResult<()> {
        let removed = self
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some();

        if removed {
            self.persist()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reservoir::error::ErrorKind;
    use reservoir::store::KeyValueStore;

    use super::FileStore;

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.path(), path);
        assert_eq!(store.get("faults", "lastError").unwrap(), None);
        store
            .put("faults", "lastError", "2025-06-01T12:00:00 -- Sensor fault")
            .unwrap();
        store.put("system", "restart", "software").unwrap();

        let mut reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("faults", "lastError").unwrap().as_deref(),
            Some("2025-06-01T12:00:00 -- Sensor fault")
        );

        reopened.remove("faults", "lastError").unwrap();
        reopened.remove("faults", "missing").unwrap();

        let mut reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("faults", "lastError").unwrap(), None);
        assert_eq!(
            reopened.get("system", "restart").unwrap().as_deref(),
            Some("software")
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupted_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(FileStore::open(&path).is_err());
    }

    #[test]
    fn write_failures_are_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        // The parent directory of the document does not exist.
        let mut store = FileStore::open(dir.path().join("missing").join("state.json")).unwrap();

        let error = store.put("faults", "lastError", "value").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Store);
    }
}
