//! In-memory archive backend.

use super::backend::RemoteArchive;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory archive using `DashMap`.
///
/// Clones share the same entries, so a test can keep one handle for
/// inspection while the registry owns another.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryArchive {
    /// Creates a new empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an owner's entry directly.
    pub fn insert(&self, owner_id: &str, bytes: Vec<u8>) {
        self.entries.insert(owner_id.to_string(), bytes);
    }

    /// Returns a copy of the owner's entry.
    pub fn get(&self, owner_id: &str) -> Option<Vec<u8>> {
        self.entries.get(owner_id).map(|e| e.value().clone())
    }

    /// Returns the number of owners with an entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no owner has an entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RemoteArchive for MemoryArchive {
    async fn exists(&self, owner_id: &str) -> Result<bool> {
        Ok(self.entries.contains_key(owner_id))
    }

    async fn pull(&self, owner_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(owner_id))
    }

    async fn push(&self, owner_id: &str, bytes: Vec<u8>) -> Result<()> {
        self.entries.insert(owner_id.to_string(), bytes);
        Ok(())
    }
}
