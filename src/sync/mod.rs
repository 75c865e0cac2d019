//! Background sync of owner stores to the remote archive.
//!
//! Every owner has one [`SyncCoordinator`] owning one worker task. Mutations
//! call [`SyncCoordinator::schedule_flush`], which never blocks; the worker
//! waits out a short debounce window, snapshots the whole store file and
//! pushes it. Triggers that arrive while a flush is already queued are
//! absorbed into it.

mod coordinator;


pub use coordinator::{SyncCoordinator, SyncStatus};
