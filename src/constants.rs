//! Shared defaults and limits.
//!
//! Everything tunable at runtime is also exposed through [`crate::config::Settings`];
//! the values here are the defaults used when a field is omitted.

/// Default: background sync to the remote archive is on.
pub const DEFAULT_SYNC_ENABLED: bool = true;

/// Default lifetime of a cached collision probe result.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default number of names probed per chunk by `probe_batched`.
pub const DEFAULT_COLLISION_BATCH_SIZE: usize = 50;

/// Default number of probe attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the second probe attempt. Doubles per attempt.
pub const DEFAULT_BASE_RETRY_DELAY_SECS: f64 = 1.0;

/// Upper bound for a single backoff sleep.
pub const DEFAULT_MAX_RETRY_DELAY_SECS: f64 = 30.0;

/// Window during which repeated flush triggers collapse into one push.
pub const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 250;

/// Concurrent per-name lookups inside one probe batch.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// Maximum number of collision cache entries before oldest-first eviction.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;

/// Fraction of failed lookups above which a probe batch counts as a systemic outage.
pub const PROBE_FAILURE_THRESHOLD: f64 = 0.5;

/// Schema marker stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Longest accepted owner id.
pub const MAX_OWNER_ID_LEN: usize = 128;

/// Media type families a record may carry.
pub const ALLOWED_MEDIA_FAMILIES: &[&str] = &["image", "video"];

/// File name of an owner's store inside its directory.
pub const STORE_FILE_NAME: &str = "metadata.db";
