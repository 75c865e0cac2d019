//! Per-owner flush worker.

use crate::archive::RemoteArchive;
use crate::error::{Error, Result};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Point-in-time view of an owner's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    /// A flush is queued or a push is in flight.
    pub pending: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Error from the most recent failed push, cleared by the next success.
    pub last_error: Option<String>,
}

/// `queued` is the coalescing flag and is cleared when the worker takes its
/// snapshot; `in_flight` covers the push itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FlushFlags {
    queued: bool,
    in_flight: bool,
}

impl FlushFlags {
    fn is_idle(&self) -> bool {
        !self.queued && !self.in_flight
    }
}

struct Shared {
    local: LocalStore,
    archive: Arc<dyn RemoteArchive>,
    enabled: AtomicBool,
    flags: watch::Sender<FlushFlags>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn owner_id(&self) -> &str {
        self.local.owner_id()
    }

    async fn flush_once(&self) {
        self.flags.send_modify(|flags| {
            flags.queued = false;
            flags.in_flight = true;
        });

        match self.push_snapshot().await {
            Ok(bytes) => {
                *self.last_sync.lock() = Some(Utc::now());
                *self.last_error.lock() = None;
                info!(owner = self.owner_id(), bytes, "Pushed store snapshot");
            },
            Err(err) => {
                warn!(
                    owner = self.owner_id(),
                    error = %err,
                    "Store push failed, next mutation will retry"
                );
                *self.last_error.lock() = Some(err.to_string());
            },
        }

        self.flags.send_modify(|flags| flags.in_flight = false);
    }

    async fn push_snapshot(&self) -> Result<usize> {
        let local = self.local.clone();
        let bytes = tokio::task::spawn_blocking(move || local.snapshot_bytes())
            .await
            .map_err(|e| Error::store("snapshot task", e))??;
        let len = bytes.len();
        self.archive
            .push(self.owner_id(), bytes)
            .await
            .map_err(|e| Error::store(format!("push for owner '{}'", self.owner_id()), e))?;
        Ok(len)
    }
}

/// Coalescing, single-flight pusher for one owner's store file.
///
/// Must be created inside a tokio runtime. Call [`Self::shutdown`] before
/// dropping to guarantee that a queued flush reaches the archive.
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    trigger: mpsc::UnboundedSender<()>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("owner_id", &self.shared.owner_id())
            .field("enabled", &self.is_enabled())
            .field("flags", &*self.shared.flags.borrow())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Starts the owner's worker task.
    pub fn spawn(
        local: LocalStore,
        archive: Arc<dyn RemoteArchive>,
        enabled: bool,
        debounce: Duration,
    ) -> Self {
        let (flags, _) = watch::channel(FlushFlags::default());
        let shared = Arc::new(Shared {
            local,
            archive,
            enabled: AtomicBool::new(enabled),
            flags,
            last_sync: Mutex::new(None),
            last_error: Mutex::new(None),
        });
        let (trigger, trigger_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            Arc::clone(&shared),
            trigger_rx,
            shutdown_rx,
            debounce,
        ));
        debug!(owner = shared.owner_id(), enabled, "Sync worker started");

        Self {
            shared,
            trigger,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn owner_id(&self) -> &str {
        self.shared.owner_id()
    }

    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::SeqCst);
    }

    /// Stops future flushes from being scheduled. A flush already queued
    /// still runs.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Queues a flush unless sync is disabled or one is already queued.
    ///
    /// Returns `true` if this call queued a new flush.
    pub fn schedule_flush(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let queued = self.shared.flags.send_if_modified(|flags| {
            if flags.queued {
                false
            } else {
                flags.queued = true;
                true
            }
        });
        if !queued {
            return false;
        }

        if self.trigger.send(()).is_err() {
            self.shared.flags.send_modify(|flags| flags.queued = false);
            warn!(owner = self.owner_id(), "Sync worker has stopped, flush dropped");
            return false;
        }
        debug!(owner = self.owner_id(), "Flush scheduled");
        true
    }

    /// Waits until nothing is queued or in flight.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let mut flags = self.shared.flags.subscribe();
        tokio::time::timeout(timeout, flags.wait_for(FlushFlags::is_idle))
            .await
            .is_ok_and(|idle| idle.is_ok())
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            enabled: self.is_enabled(),
            pending: !self.shared.flags.borrow().is_idle(),
            last_sync_time: *self.shared.last_sync.lock(),
            last_error: self.shared.last_error.lock().clone(),
        }
    }

    /// Stops the worker after it has pushed any queued flush.
    ///
    /// Later calls to [`Self::schedule_flush`] return `false`.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(err) = worker.await
        {
            warn!(owner = self.owner_id(), error = %err, "Sync worker panicked");
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut trigger: mpsc::UnboundedReceiver<()>,
    mut shutdown: watch::Receiver<bool>,
    debounce: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = trigger.recv() => {
                if received.is_none() {
                    break;
                }
            },
        }

        if !debounce.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {},
                _ = shutdown.changed() => {},
            }
        }
        while trigger.try_recv().is_ok() {}

        shared.flush_once().await;

        if *shutdown.borrow() {
            break;
        }
    }

    // Late senders now get an error and clear their own flag.
    trigger.close();
    if shared.flags.borrow().queued {
        debug!(owner = shared.owner_id(), "Final flush before shutdown");
        shared.flush_once().await;
    }
    debug!(owner = shared.owner_id(), "Sync worker stopped");
}
