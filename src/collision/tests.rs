use super::*;
use crate::error::{Error, ErrorKind, Result};
use crate::store::CollisionSummary;
use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const OWNER: &str = "u1";

/// Lookup double with scripted failures.
#[derive(Default)]
struct ScriptedLookup {
    existing: HashMap<String, CollisionSummary>,
    /// Names whose lookup always fails.
    broken: HashSet<String>,
    /// Names the backing store refuses as invalid input.
    rejected: HashSet<String>,
    /// The first `outage` lookups fail regardless of name.
    outage: usize,
    calls: AtomicUsize,
}

impl ScriptedLookup {
    fn with_existing(mut self, name: &str) -> Self {
        let summary = CollisionSummary {
            id: format!("id-{name}"),
            size: 10,
            created_at: None,
            ingested_at: Utc::now(),
        };
        self.existing.insert(name.to_string(), summary);
        self
    }

    fn with_broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    fn with_rejected(mut self, name: &str) -> Self {
        self.rejected.insert(name.to_string());
        self
    }

    fn with_outage(mut self, lookups: usize) -> Self {
        self.outage = lookups;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollisionLookup for ScriptedLookup {
    async fn lookup(&self, _owner_id: &str, name: &str) -> Result<Option<CollisionSummary>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected.contains(name) {
            return Err(Error::validation(format!("name '{name}' is not allowed")));
        }
        if call < self.outage || self.broken.contains(name) {
            return Err(Error::store(
                "lookup",
                std::io::Error::other("database is locked"),
            ));
        }
        Ok(self.existing.get(name).cloned())
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn fast_config() -> ProbeConfig {
    ProbeConfig {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        batch_size: 50,
        concurrency: 4,
    }
}

fn probe_with(lookup: Arc<ScriptedLookup>, config: ProbeConfig) -> CollisionProbe {
    let cache = Arc::new(CollisionCache::new(Duration::from_secs(300), 1024));
    CollisionProbe::new(lookup, cache, config)
}

// ── cache ────────────────────────────────────────────────────────────────

#[test]
fn test_cache_miss_then_hit() {
    let cache = CollisionCache::new(Duration::from_secs(60), 16);
    let key = names(&["a.jpg", "b.jpg"]);
    assert!(cache.get(OWNER, &key).is_none());

    let mut map = CollisionMap::new();
    map.insert("a.jpg".into(), CollisionInfo::NoCollision);
    map.insert("b.jpg".into(), CollisionInfo::NoCollision);
    cache.put(OWNER, &key, map.clone(), cache.ttl());

    assert_eq!(cache.get(OWNER, &key), Some(map));
    assert!(cache.get("u2", &key).is_none());
}

#[test]
fn test_cache_entry_expires() {
    let cache = CollisionCache::new(Duration::from_millis(30), 16);
    let key = names(&["a.jpg"]);
    cache.put(OWNER, &key, CollisionMap::new(), cache.ttl());
    std::thread::sleep(Duration::from_millis(60));

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.expired_entries, 1);
    assert_eq!(stats.valid_entries, 0);

    assert!(cache.get(OWNER, &key).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_cache_invalidate_owner_and_all() {
    let cache = CollisionCache::new(Duration::from_secs(60), 16);
    cache.put(OWNER, &names(&["a"]), CollisionMap::new(), cache.ttl());
    cache.put(OWNER, &names(&["b"]), CollisionMap::new(), cache.ttl());
    cache.put("u2", &names(&["a"]), CollisionMap::new(), cache.ttl());

    assert_eq!(cache.invalidate_owner(OWNER), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.invalidate_all(), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_cache_purge_expired_keeps_fresh() {
    let cache = CollisionCache::new(Duration::from_secs(60), 16);
    cache.put(OWNER, &names(&["old"]), CollisionMap::new(), Duration::from_millis(10));
    cache.put(OWNER, &names(&["new"]), CollisionMap::new(), cache.ttl());
    std::thread::sleep(Duration::from_millis(30));

    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.get(OWNER, &names(&["new"])).is_some());
}

#[test]
fn test_cache_evicts_oldest_at_capacity() {
    let cache = CollisionCache::new(Duration::from_secs(60), 2);
    cache.put(OWNER, &names(&["first"]), CollisionMap::new(), cache.ttl());
    std::thread::sleep(Duration::from_millis(2));
    cache.put(OWNER, &names(&["second"]), CollisionMap::new(), cache.ttl());
    std::thread::sleep(Duration::from_millis(2));
    cache.put(OWNER, &names(&["third"]), CollisionMap::new(), cache.ttl());

    assert_eq!(cache.len(), 2);
    assert!(cache.get(OWNER, &names(&["first"])).is_none());
    assert!(cache.get(OWNER, &names(&["second"])).is_some());
    assert!(cache.get(OWNER, &names(&["third"])).is_some());
}

#[test]
fn test_cache_stats_report_ttl() {
    let cache = CollisionCache::new(Duration::from_secs(300), 16);
    assert_eq!(cache.stats().ttl_seconds, 300);
    assert_eq!(cache.stats().total_entries, 0);
}

proptest! {
    #[test]
    fn prop_cache_key_ignores_order_and_duplicates(
        list in prop::collection::vec("[a-z]{1,6}\\.jpg", 1..12)
    ) {
        let cache = CollisionCache::new(Duration::from_secs(60), 16);
        cache.put(OWNER, &list, CollisionMap::new(), cache.ttl());

        let mut shuffled: Vec<String> = list.iter().rev().cloned().collect();
        shuffled.extend(list.iter().take(2).cloned());
        prop_assert!(cache.get(OWNER, &shuffled).is_some());
        prop_assert_eq!(cache.len(), 1);
    }
}

// ── probe ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_reports_found_and_clear() {
    let lookup = Arc::new(ScriptedLookup::default().with_existing("a.jpg"));
    let probe = probe_with(lookup.clone(), fast_config());

    let result = probe.probe(OWNER, &names(&["a.jpg", "b.jpg"])).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result["a.jpg"].existing().unwrap().id, "id-a.jpg");
    assert!(result["b.jpg"].is_clear());
}

#[tokio::test]
async fn test_probe_uses_cache_for_same_name_set() {
    let lookup = Arc::new(ScriptedLookup::default());
    let probe = probe_with(lookup.clone(), fast_config());

    probe.probe(OWNER, &names(&["a", "b"])).await.unwrap();
    probe.probe(OWNER, &names(&["b", "a", "a"])).await.unwrap();
    assert_eq!(lookup.calls(), 2);
}

#[tokio::test]
async fn test_probe_empty_request() {
    let lookup = Arc::new(ScriptedLookup::default());
    let probe = probe_with(lookup.clone(), fast_config());

    assert!(probe.probe(OWNER, &[]).await.unwrap().is_empty());
    assert_eq!(lookup.calls(), 0);
    assert!(probe.cache().is_empty());
}

#[tokio::test]
async fn test_probe_isolates_minority_failures() {
    let lookup = Arc::new(
        ScriptedLookup::default()
            .with_broken("b")
            .with_broken("d"),
    );
    let probe = probe_with(lookup.clone(), fast_config());

    let result = probe.probe(OWNER, &names(&["a", "b", "c", "d"])).await.unwrap();
    assert!(result["a"].is_clear());
    assert!(result["b"].is_degraded());
    assert!(result["c"].is_clear());
    assert!(result["d"].is_degraded());
    assert!(probe.cache().is_empty(), "partial results must not be cached");
}

#[tokio::test]
async fn test_probe_majority_failure_is_systemic() {
    let lookup = Arc::new(
        ScriptedLookup::default()
            .with_broken("a")
            .with_broken("b")
            .with_broken("c"),
    );
    let probe = probe_with(lookup, fast_config());

    let err = probe.probe(OWNER, &names(&["a", "b", "c", "d"])).await.unwrap_err();
    assert!(matches!(err, Error::SystemDegraded { failed: 3, total: 4 }));
}

#[tokio::test]
async fn test_retry_recovers_after_transient_outage() {
    // Two full attempts of four lookups fail, the third succeeds.
    let lookup = Arc::new(ScriptedLookup::default().with_existing("c").with_outage(8));
    let probe = probe_with(lookup.clone(), fast_config());
    let request = names(&["a", "b", "c", "d"]);

    let started = Instant::now();
    let result = probe
        .probe_with_fallback(OWNER, &request, true)
        .await
        .unwrap();

    assert_eq!(lookup.calls(), 12);
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(result.values().all(|info| !info.is_degraded()));
    assert!(result["c"].existing().is_some());
    assert!(result["a"].is_clear());
}

#[tokio::test]
async fn test_retry_exhausted_is_recovery_failed() {
    let lookup = Arc::new(ScriptedLookup::default().with_outage(usize::MAX));
    let probe = probe_with(lookup.clone(), fast_config());

    let err = probe
        .probe_with_retry(OWNER, &names(&["a", "b"]), 3, Duration::from_millis(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecoveryFailed);
    assert!(matches!(err, Error::RecoveryFailed { attempts: 3, .. }));
    assert_eq!(lookup.calls(), 6);
}

#[tokio::test]
async fn test_fallback_disabled_surfaces_failure() {
    let lookup = Arc::new(ScriptedLookup::default().with_outage(usize::MAX));
    let probe = probe_with(lookup, fast_config());

    let err = probe
        .probe_with_fallback(OWNER, &names(&["a"]), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecoveryFailed);
}

#[tokio::test]
async fn test_fallback_marks_every_name_degraded() {
    let lookup = Arc::new(ScriptedLookup::default().with_outage(usize::MAX));
    let probe = probe_with(lookup, fast_config());
    let request: Vec<String> = (0..7).map(|i| format!("img_{i}.jpg")).collect();

    let result = probe
        .probe_with_fallback(OWNER, &request, true)
        .await
        .unwrap();

    assert_eq!(result.len(), request.len());
    for name in &request {
        let info = &result[name];
        assert!(info.is_degraded());
        assert!(!info.is_clear());
        assert!(info.warning().unwrap().contains("possible collision"));
    }
}

#[tokio::test]
async fn test_invalid_input_surfaces_without_retry_or_fallback() {
    let lookup = Arc::new(
        ScriptedLookup::default()
            .with_existing("a")
            .with_rejected("b"),
    );
    let checker = probe_with(lookup.clone(), fast_config());
    let request = names(&["a", "b", "c", "d"]);

    let err = checker
        .probe_with_fallback(OWNER, &request, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    // One round of lookups, no second attempt.
    assert_eq!(lookup.calls(), request.len());
    assert!(checker.cache().is_empty());
}

#[tokio::test]
async fn test_invalid_owner_never_reaches_lookup() {
    let lookup = Arc::new(ScriptedLookup::default());
    let checker = probe_with(lookup.clone(), fast_config());

    for enable_fallback in [true, false] {
        let err = checker
            .probe_with_fallback("../escape", &names(&["a", "b"]), enable_fallback)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(lookup.calls(), 0);
}

#[test]
fn test_batch_optimize_chunks() {
    let list: Vec<String> = (0..120).map(|i| i.to_string()).collect();
    let batches = CollisionProbe::batch_optimize(&list, 50);
    assert_eq!(
        batches.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![50, 50, 20]
    );
    assert!(CollisionProbe::batch_optimize(&[], 50).is_empty());
}

#[tokio::test]
async fn test_probe_batched_merges_chunks() {
    let lookup = Arc::new(ScriptedLookup::default().with_existing("photo_7.jpg"));
    let probe = probe_with(lookup.clone(), fast_config());
    let request: Vec<String> = (0..120).map(|i| format!("photo_{i}.jpg")).collect();

    let result = probe.probe_batched(OWNER, &request, true).await.unwrap();

    assert_eq!(result.len(), 120);
    assert_eq!(lookup.calls(), 120);
    // One cached result per chunk.
    assert_eq!(probe.cache().len(), 3);
    assert!(result["photo_7.jpg"].existing().is_some());
    assert_eq!(result.values().filter(|i| i.is_clear()).count(), 119);
}

#[test]
fn test_collision_info_serializes_tagged() {
    let json = serde_json::to_value(CollisionInfo::degraded("offline")).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["warning"], "offline");

    let json = serde_json::to_value(CollisionInfo::NoCollision).unwrap();
    assert_eq!(json["status"], "no_collision");
}
