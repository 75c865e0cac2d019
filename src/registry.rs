//! Explicit per-owner service registry.
//!
//! [`StoreRegistry`] creates each owner's store, record layer and sync
//! worker on first use and tears them down on [`StoreRegistry::close`] or
//! [`StoreRegistry::shutdown`]. It is passed around as an `Arc`; there is no
//! process-wide instance.

use crate::archive::RemoteArchive;
use crate::collision::{CollisionCache, CollisionLookup, CollisionProbe, ProbeConfig};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::paths;
use crate::store::{CollisionSummary, LocalStore, RecordStore};
use crate::sync::SyncCoordinator;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Everything the registry holds for one owner.
#[derive(Debug)]
pub struct OwnerHandle {
    records: RecordStore,
    sync: Arc<SyncCoordinator>,
    hydrated: bool,
}

impl OwnerHandle {
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Whether opening this owner pulled their store from the archive.
    pub fn hydrated(&self) -> bool {
        self.hydrated
    }
}

type Slot = Arc<OnceCell<Arc<OwnerHandle>>>;

/// Create-on-demand registry of owner stores sharing one archive and one
/// collision cache.
pub struct StoreRegistry {
    settings: Settings,
    data_dir: PathBuf,
    archive: Arc<dyn RemoteArchive>,
    cache: Arc<CollisionCache>,
    owners: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("data_dir", &self.data_dir)
            .field("owners", &self.owners())
            .finish_non_exhaustive()
    }
}

impl StoreRegistry {
    /// Creates an empty registry storing owner files under `data_dir`.
    pub fn new(
        settings: Settings,
        data_dir: impl Into<PathBuf>,
        archive: Arc<dyn RemoteArchive>,
    ) -> Self {
        let cache = Arc::new(CollisionCache::new(
            settings.cache_ttl(),
            settings.cache_max_entries,
        ));
        Self {
            settings,
            data_dir: data_dir.into(),
            archive,
            cache,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache(&self) -> &Arc<CollisionCache> {
        &self.cache
    }

    /// A probe that looks names up through this registry.
    pub fn probe(self: &Arc<Self>) -> CollisionProbe {
        CollisionProbe::new(
            Arc::clone(self) as Arc<dyn CollisionLookup>,
            Arc::clone(&self.cache),
            ProbeConfig::from_settings(&self.settings),
        )
    }

    /// Returns the owner's handle, creating the store (hydrated from the
    /// archive when it holds an entry) and starting its sync worker on first
    /// use. Concurrent opens of the same owner share one initialization.
    pub async fn open(&self, owner_id: &str) -> Result<Arc<OwnerHandle>> {
        let path = paths::store_path(&self.data_dir, owner_id)?;
        let slot = Arc::clone(self.owners.lock().entry(owner_id.to_string()).or_default());

        let handle = slot
            .get_or_try_init(|| self.create_owner(owner_id, path))
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Shorthand for the owner's [`RecordStore`].
    pub async fn records(&self, owner_id: &str) -> Result<RecordStore> {
        Ok(self.open(owner_id).await?.records().clone())
    }

    /// The owner's handle if it is already open.
    pub fn get(&self, owner_id: &str) -> Option<Arc<OwnerHandle>> {
        self.owners
            .lock()
            .get(owner_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Schedules a flush for an open owner. Returns `false` if the owner is
    /// not open or no new flush was queued.
    pub fn schedule_flush(&self, owner_id: &str) -> bool {
        self.get(owner_id)
            .is_some_and(|handle| handle.sync().schedule_flush())
    }

    /// Ids of the currently open owners, sorted.
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self
            .owners
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(owner, _)| owner.clone())
            .collect();
        owners.sort_unstable();
        owners
    }

    /// Flushes and stops the owner's worker, then forgets the owner.
    ///
    /// Returns `false` if the owner was not open.
    pub async fn close(&self, owner_id: &str) -> bool {
        let slot = self.owners.lock().remove(owner_id);
        let Some(handle) = slot.and_then(|slot| slot.get().cloned()) else {
            return false;
        };
        handle.sync().shutdown().await;
        self.cache.invalidate_owner(owner_id);
        info!(owner = owner_id, "Closed owner store");
        true
    }

    /// Closes every open owner.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, Slot)> = self.owners.lock().drain().collect();
        let mut closed = 0usize;
        for (owner_id, slot) in slots {
            if let Some(handle) = slot.get() {
                handle.sync().shutdown().await;
                debug!(owner = %owner_id, "Owner sync stopped");
                closed += 1;
            }
        }
        self.cache.invalidate_all();
        info!(closed, "Store registry shut down");
    }

    async fn create_owner(&self, owner_id: &str, path: PathBuf) -> Result<Arc<OwnerHandle>> {
        let hydrated = LocalStore::ensure(&path, owner_id, self.archive.as_ref()).await?;

        let owner = owner_id.to_string();
        let local = tokio::task::spawn_blocking(move || LocalStore::open(&path, &owner))
            .await
            .map_err(|e| Error::store("open store task", e))??;

        let sync = Arc::new(SyncCoordinator::spawn(
            local.clone(),
            Arc::clone(&self.archive),
            self.settings.sync_enabled,
            self.settings.flush_debounce(),
        ));
        let records = RecordStore::new(local)
            .with_sync(Arc::clone(&sync))
            .with_cache(Arc::clone(&self.cache));

        info!(owner = owner_id, hydrated, "Opened owner store");
        Ok(Arc::new(OwnerHandle {
            records,
            sync,
            hydrated,
        }))
    }
}

#[async_trait]
impl CollisionLookup for StoreRegistry {
    async fn lookup(&self, owner_id: &str, name: &str) -> Result<Option<CollisionSummary>> {
        let handle = self.open(owner_id).await?;
        handle.records().lookup(owner_id, name).await
    }
}
