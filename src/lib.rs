//! metasync: a local-first, per-owner metadata store.
//!
//! Each owner's records live in one embedded SQLite file that is hydrated
//! from a [`RemoteArchive`] on first use and pushed back whole by a
//! coalescing background worker after every mutation. Before an upload may
//! overwrite anything, [`CollisionProbe`] reports which candidate names are
//! already taken, failing closed when it cannot tell.
//!
//! # Example
//!
//! ```ignore
//! use metasync::{MemoryArchive, Record, Settings, StoreRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(StoreRegistry::new(
//!     Settings::default(),
//!     "/var/lib/metasync",
//!     Arc::new(MemoryArchive::new()),
//! ));
//! let records = registry.records("u1").await?;
//! let probe = registry.probe();
//! let found = probe.probe_with_fallback("u1", &names, true).await?;
//! ```

pub mod archive;
pub mod collision;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod registry;
pub mod reliability;
pub mod store;
pub mod sync;

pub use archive::{FilesystemArchive, MemoryArchive, RemoteArchive};
pub use collision::{
    CacheStats, CollisionCache, CollisionInfo, CollisionLookup, CollisionMap, CollisionProbe,
    ProbeConfig,
};
pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use registry::{OwnerHandle, StoreRegistry};
pub use store::{
    CollisionSummary, ContentPointer, LocalStore, PointerRole, Record, RecordStore,
};
pub use sync::{SyncCoordinator, SyncStatus};
