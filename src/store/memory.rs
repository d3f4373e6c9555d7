use async_trait::async_trait;
use dashmap::DashMap;

use super::{flat_key, Fields, SessionStore, StoreError};
use crate::model::SessionKey;

/// Process-local store; the default when no state path is configured.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Fields>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<Fields>, StoreError> {
        Ok(self.entries.get(&flat_key(key)).map(|e| e.value().clone()))
    }

    async fn save(&self, key: &SessionKey, fields: Fields) -> Result<(), StoreError> {
        self.entries.insert(flat_key(key), fields);
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.entries.remove(&flat_key(key));
        Ok(())
    }
}
