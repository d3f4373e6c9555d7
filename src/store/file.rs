// Single JSON document holding every session, rewritten atomically
// (temp file + rename) on each change.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{flat_key, Fields, SessionStore, StoreError};
use crate::model::SessionKey;

type Document = BTreeMap<String, Fields>;

pub struct FileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read(&self) -> Result<Document, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupted {
                path: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn write(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
        }
        let bytes = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Corrupted {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_err(e))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<Fields>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(&flat_key(key)))
    }

    async fn save(&self, key: &SessionKey, fields: Fields) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        doc.insert(flat_key(key), fields);
        self.write(&doc).await
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        if doc.remove(&flat_key(key)).is_none() {
            return Ok(());
        }
        self.write(&doc).await
    }
}
