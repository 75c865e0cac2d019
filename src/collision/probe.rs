//! Batch collision probing with failure isolation, retry and fallback.

use super::cache::CollisionCache;
use super::types::{CollisionInfo, CollisionMap};
use crate::config::Settings;
use crate::constants;
use crate::error::{Error, ErrorKind, Result};
use crate::paths;
use crate::reliability::{RetryConfig, retry_async};
use crate::store::{CollisionSummary, RecordStore};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Single-name lookup used by [`CollisionProbe`].
#[async_trait]
pub trait CollisionLookup: Send + Sync {
    /// Summary of the present record named `name` for `owner_id`, if any.
    async fn lookup(&self, owner_id: &str, name: &str) -> Result<Option<CollisionSummary>>;
}

#[async_trait]
impl CollisionLookup for RecordStore {
    async fn lookup(&self, owner_id: &str, name: &str) -> Result<Option<CollisionSummary>> {
        if owner_id != self.owner_id() {
            return Err(Error::validation(format!(
                "store for '{}' cannot answer lookups for '{owner_id}'",
                self.owner_id()
            )));
        }
        let store = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || store.find_collision(&name))
            .await
            .map_err(|e| Error::store("collision lookup task", e))?
    }
}

/// Tuning for [`CollisionProbe`].
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Total attempts made by `probe_with_fallback`.
    pub max_retries: u32,
    /// Sleep before the second attempt; doubled for each later one.
    pub base_delay: Duration,
    /// Cap on a single backoff sleep.
    pub max_delay: Duration,
    /// Names per chunk in `probe_batched`.
    pub batch_size: usize,
    /// Parallel lookups within one probe.
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ProbeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_retry_delay(),
            max_delay: settings.max_retry_delay(),
            batch_size: settings.collision_batch_size,
            concurrency: settings.probe_concurrency,
        }
    }
}

/// Answers "which of these names already exist?" for one upload batch.
///
/// Results are fail-closed: a name is only [`CollisionInfo::NoCollision`]
/// when its lookup actually succeeded and found nothing.
pub struct CollisionProbe {
    lookup: Arc<dyn CollisionLookup>,
    cache: Arc<CollisionCache>,
    config: ProbeConfig,
}

impl std::fmt::Debug for CollisionProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionProbe")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CollisionProbe {
    pub fn new(
        lookup: Arc<dyn CollisionLookup>,
        cache: Arc<CollisionCache>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            lookup,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CollisionCache> {
        &self.cache
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Checks every name once.
    ///
    /// A cache hit for the exact name set is returned as is. Otherwise each
    /// name is looked up; a name whose lookup fails is reported as
    /// [`CollisionInfo::Degraded`]. If more than half of the lookups fail the
    /// whole call fails with [`Error::SystemDegraded`]. Only maps without
    /// failures are cached.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] from the owner id or from any lookup is returned
    /// as is and never counted as a lookup failure.
    pub async fn probe(&self, owner_id: &str, names: &[String]) -> Result<CollisionMap> {
        paths::validate_owner_id(owner_id)?;
        let unique = unique_names(names);
        if unique.is_empty() {
            return Ok(CollisionMap::new());
        }

        if let Some(hit) = self.cache.get(owner_id, &unique) {
            debug!(owner = owner_id, names = unique.len(), "Collision cache hit");
            return Ok(hit);
        }

        let outcomes: Vec<(String, Result<Option<CollisionSummary>>)> =
            stream::iter(unique.iter().cloned())
                .map(|name| async move {
                    let outcome = self.lookup.lookup(owner_id, &name).await;
                    (name, outcome)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        let total = outcomes.len();
        let mut failed = 0usize;
        let mut result = CollisionMap::new();
        for (name, outcome) in outcomes {
            let info = match outcome {
                Ok(Some(existing)) => CollisionInfo::Found { existing },
                Ok(None) => CollisionInfo::NoCollision,
                Err(err) if err.kind() == ErrorKind::Validation => return Err(err),
                Err(err) => {
                    failed += 1;
                    let err = Error::collision_probe(&name, err.to_string());
                    warn!(owner = owner_id, error = %err, "Collision lookup failed");
                    CollisionInfo::degraded(format!(
                        "{err}; treat as a possible collision"
                    ))
                },
            };
            result.insert(name, info);
        }

        if failed as f64 / total as f64 > constants::PROBE_FAILURE_THRESHOLD {
            warn!(owner = owner_id, failed, total, "Collision probe degraded");
            return Err(Error::SystemDegraded { failed, total });
        }

        if failed == 0 {
            self.cache
                .put(owner_id, &unique, result.clone(), self.cache.ttl());
        }
        Ok(result)
    }

    /// Runs [`Self::probe`] up to `max_retries` times in total while it
    /// fails with [`Error::SystemDegraded`], sleeping `base_delay`,
    /// `2·base_delay`, … between attempts.
    ///
    /// # Errors
    ///
    /// - [`Error::RecoveryFailed`] once every attempt was degraded
    /// - Any other error from the first attempt that raised it
    pub async fn probe_with_retry(
        &self,
        owner_id: &str,
        names: &[String],
        max_retries: u32,
        base_delay: Duration,
    ) -> Result<CollisionMap> {
        let retry = RetryConfig::default()
            .with_max_attempts(max_retries)
            .with_initial_delay(base_delay)
            .with_max_delay(self.config.max_delay.max(base_delay));
        let attempts = retry.attempts();

        let outcome = retry_async(
            &retry,
            "collision probe",
            || self.probe(owner_id, names),
            Error::is_retryable,
        )
        .await;

        match outcome {
            Err(err) if err.is_retryable() => Err(Error::RecoveryFailed {
                attempts,
                last_error: err.to_string(),
            }),
            other => other,
        }
    }

    /// Probes with the configured retry policy.
    ///
    /// When retries are exhausted and `enable_fallback` is set, every
    /// requested name is returned as [`CollisionInfo::Degraded`]; no name is
    /// ever reported clear without having been checked.
    pub async fn probe_with_fallback(
        &self,
        owner_id: &str,
        names: &[String],
        enable_fallback: bool,
    ) -> Result<CollisionMap> {
        let outcome = self
            .probe_with_retry(
                owner_id,
                names,
                self.config.max_retries,
                self.config.base_delay,
            )
            .await;

        match outcome {
            Err(err @ Error::RecoveryFailed { .. }) if enable_fallback => {
                warn!(
                    owner = owner_id,
                    names = names.len(),
                    error = %err,
                    "Collision checks unavailable, marking all names degraded"
                );
                let warning =
                    format!("collision check unavailable ({err}); treat as a possible collision");
                Ok(unique_names(names)
                    .into_iter()
                    .map(|name| (name, CollisionInfo::degraded(warning.clone())))
                    .collect())
            },
            other => other,
        }
    }

    /// Splits `names` into chunks of at most `batch_size`.
    pub fn batch_optimize(names: &[String], batch_size: usize) -> Vec<Vec<String>> {
        names
            .chunks(batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect()
    }

    /// Probes a large name list in `batch_size` chunks, each with retry and
    /// fallback, and merges the results.
    pub async fn probe_batched(
        &self,
        owner_id: &str,
        names: &[String],
        enable_fallback: bool,
    ) -> Result<CollisionMap> {
        let unique = unique_names(names);
        let batches = Self::batch_optimize(&unique, self.config.batch_size);
        let mut merged = CollisionMap::new();
        for batch in &batches {
            merged.extend(
                self.probe_with_fallback(owner_id, batch, enable_fallback)
                    .await?,
            );
        }
        info!(
            owner = owner_id,
            names = merged.len(),
            batches = batches.len(),
            degraded = merged.values().filter(|i| i.is_degraded()).count(),
            "Collision probe complete"
        );
        Ok(merged)
    }
}

/// De-duplicates `names`, keeping first-seen order.
fn unique_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}
