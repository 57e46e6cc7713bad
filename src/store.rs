use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::StoreError, identity::Identity};

/// Persistent key-value store for enrolled identities, keyed by principal.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get(&self, principal: &str) -> Result<Option<Identity>, StoreError>;
    async fn put(&self, identity: &Identity) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, principal: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.read().get(principal).cloned())
    }

    async fn put(&self, identity: &Identity) -> Result<(), StoreError> {
        self.identities
            .write()
            .insert(identity.principal().to_string(), identity.clone());
        Ok(())
    }
}

/// Stores one JSON document per principal below a directory, e.g. `.hfc-kvstore`.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn entry(&self, principal: &str) -> Result<PathBuf, StoreError> {
        if principal.is_empty()
            || principal
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '\0')
            || principal == "."
            || principal == ".."
        {
            return Err(StoreError(format!("invalid principal name {principal:?}")));
        }
        Ok(self.path.join(format!("{principal}.json")))
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self, principal: &str) -> Result<Option<Identity>, StoreError> {
        let entry = self.entry(principal)?;
        let bytes = match tokio::fs::read(&entry).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError(format!("{}: {err}", entry.display()))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StoreError(format!("{}: {err}", entry.display())))
    }

    async fn put(&self, identity: &Identity) -> Result<(), StoreError> {
        let entry = self.entry(identity.principal())?;
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|err| StoreError(format!("{}: {err}", self.path.display())))?;
        let bytes = serde_json::to_vec_pretty(identity)
            .map_err(|err| StoreError(err.to_string()))?;
        tokio::fs::write(&entry, bytes)
            .await
            .map_err(|err| StoreError(format!("{}: {err}", entry.display())))
    }
}
