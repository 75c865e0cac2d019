//! Collision probe command.

use anyhow::Result;
use metasync::StoreRegistry;
use std::sync::Arc;

use crate::ui;

/// Probe `names` for `owner` in configured batch sizes and print the map.
pub async fn execute(
    registry: &Arc<StoreRegistry>,
    owner: &str,
    names: &[String],
    enable_fallback: bool,
) -> Result<()> {
    let probe = registry.probe();
    let result = probe.probe_batched(owner, names, enable_fallback).await?;

    ui::print_json(&result)?;
    let degraded = result.values().filter(|info| info.is_degraded()).count();
    if degraded > 0 {
        eprintln!(
            "Warning: {degraded} of {} names could not be checked; treat them as existing",
            result.len()
        );
    }
    Ok(())
}
