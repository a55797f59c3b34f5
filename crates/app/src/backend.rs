//! File backend: both remote stores kept in one JSON document
//!
//! The engine sees the in-memory collaborators; this module only loads
//! them from disk and writes them back after every command.

use std::fs;
use std::path::{Path, PathBuf};

use common::provider::{IdentityState, IndexDocument, MemoryIdentityProvider, MemoryIndexStore};
use serde::{Deserialize, Serialize};

use crate::state::StateError;

/// On-disk layout of the store file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    identity: IdentityState,
    #[serde(default)]
    index: IndexDocument,
}

#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    pub identity: MemoryIdentityProvider,
    pub index: MemoryIndexStore,
}

impl FileBackend {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            identity: MemoryIdentityProvider::new(),
            index: MemoryIndexStore::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Err(StateError::MissingFile(path.display().to_string()));
        }

        let json = fs::read_to_string(path)?;
        let store: StoreFile = serde_json::from_str(&json)?;
        tracing::debug!(
            "loaded {} users and {} index entries from {}",
            store.identity.users.len(),
            store.index.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            identity: MemoryIdentityProvider::from_state(store.identity),
            index: MemoryIndexStore::from_document(store.index),
        })
    }

    pub fn persist(&self) -> Result<(), StateError> {
        let store = StoreFile {
            identity: self.identity.state(),
            index: self.index.document(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&store)?)?;
        Ok(())
    }
}
