//! Per-owner embedded record store.
//!
//! Each owner gets one SQLite file holding a single `records` table plus the
//! `retired_ids` tombstones. [`LocalStore`] owns the file: hydration from the
//! remote archive, schema verification, and read queries. [`RecordStore`]
//! layers validated mutations on top and notifies the owner's sync worker
//! after each successful write.
//!
//! # Example
//!
//! ```ignore
//! use metasync::store::{LocalStore, Record, RecordStore};
//!
//! let hydrated = LocalStore::ensure(&path, "u1", &archive).await?;
//! let records = RecordStore::new(LocalStore::open(&path, "u1")?);
//! records.insert(&record)?;
//! ```

mod local;
mod records;
mod types;
mod validation;


pub use local::LocalStore;
pub use records::RecordStore;
pub use types::{CollisionSummary, ContentPointer, PointerRole, Record};
pub use validation::validate_record;
