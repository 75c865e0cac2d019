//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use metasync::{
    CollisionLookup, CollisionSummary, ContentPointer, Error, MemoryArchive, Record,
    RemoteArchive, Settings, StoreRegistry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Settings with short timings so tests finish quickly.
pub fn fast_settings() -> Settings {
    Settings {
        flush_debounce_ms: 20,
        base_retry_delay_secs: 0.01,
        max_retry_delay_secs: 0.1,
        ..Settings::default()
    }
}

/// A registry rooted in a fresh temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub fn registry(archive: Arc<dyn RemoteArchive>) -> (TempDir, Arc<StoreRegistry>) {
    registry_with(fast_settings(), archive)
}

pub fn registry_with(
    settings: Settings,
    archive: Arc<dyn RemoteArchive>,
) -> (TempDir, Arc<StoreRegistry>) {
    let dir = TempDir::new().expect("temp dir");
    let registry = Arc::new(StoreRegistry::new(settings, dir.path(), archive));
    (dir, registry)
}

pub fn photo(owner: &str, name: &str) -> Record {
    Record::new(
        owner,
        name,
        2048,
        "image/jpeg",
        vec![
            ContentPointer::original(format!("blobs/{owner}/{name}")),
            ContentPointer::thumbnail(format!("thumbs/{owner}/{name}")),
        ],
    )
}

/// Archive wrapper counting pushes, optionally failing them.
#[derive(Default)]
pub struct CountingArchive {
    pub inner: MemoryArchive,
    pushes: AtomicUsize,
    pub failing: AtomicBool,
}

impl CountingArchive {
    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteArchive for CountingArchive {
    async fn exists(&self, owner_id: &str) -> anyhow::Result<bool> {
        self.inner.exists(owner_id).await
    }

    async fn pull(&self, owner_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.pull(owner_id).await
    }

    async fn push(&self, owner_id: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("archive offline");
        }
        self.inner.push(owner_id, bytes).await
    }
}

/// Lookup wrapper whose first `fail_first` calls fail.
pub struct FlakyLookup {
    inner: Arc<dyn CollisionLookup>,
    fail_first: usize,
    calls: AtomicUsize,
}

impl FlakyLookup {
    pub fn new(inner: Arc<dyn CollisionLookup>, fail_first: usize) -> Self {
        Self {
            inner,
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollisionLookup for FlakyLookup {
    async fn lookup(
        &self,
        owner_id: &str,
        name: &str,
    ) -> metasync::Result<Option<CollisionSummary>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(Error::store(
                "lookup",
                std::io::Error::other("connection reset"),
            ));
        }
        self.inner.lookup(owner_id, name).await
    }
}
