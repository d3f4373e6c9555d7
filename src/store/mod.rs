//! Session persistence: the hub-side record of which workload belongs to a
//! user session, used to find in-flight workloads again after a restart.
//!
//! Values are flat string maps; last write wins.

pub mod file;
pub mod memory;


use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::model::SessionKey;

pub use file::FileStore;
pub use memory::MemoryStore;

pub type Fields = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store i/o on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("session store {path} is corrupted: {source}")]
    Corrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &SessionKey) -> Result<Option<Fields>, StoreError>;
    async fn save(&self, key: &SessionKey, fields: Fields) -> Result<(), StoreError>;
    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

/// Flat key used by stores that cannot index by a pair.
pub(crate) fn flat_key(key: &SessionKey) -> String {
    format!("{}\u{1f}{}", key.user, key.session)
}
