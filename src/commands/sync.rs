//! Forced push command.

use anyhow::Result;
use metasync::StoreRegistry;
use std::time::Duration;

use crate::ui;

const PUSH_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn push(registry: &StoreRegistry, owner: &str) -> Result<()> {
    let handle = registry.open(owner).await?;
    let sync = handle.sync();
    if !sync.is_enabled() {
        anyhow::bail!("Sync is disabled (sync_enabled = false)");
    }

    sync.schedule_flush();
    if !sync.wait_for_idle(PUSH_TIMEOUT).await {
        anyhow::bail!("Push for '{owner}' did not finish within {PUSH_TIMEOUT:?}");
    }

    let status = sync.status();
    ui::print_json(&status)?;
    if let Some(err) = status.last_error {
        anyhow::bail!("Push for '{owner}' failed: {err}");
    }
    Ok(())
}
