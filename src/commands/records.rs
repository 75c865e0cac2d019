//! Record commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use metasync::{ContentPointer, Error, Record, StoreRegistry};
use std::time::Duration;

use crate::ui;

/// How long a mutating command waits for its push before exiting.
const FLUSH_WAIT: Duration = Duration::from_secs(60);

pub async fn ensure(registry: &StoreRegistry, owner: &str) -> Result<()> {
    let handle = registry.open(owner).await?;
    let count = handle.records().local().count(owner)?;
    if handle.hydrated() {
        println!("Hydrated store for '{owner}' from archive ({count} records)");
    } else {
        println!("Store for '{owner}' ready ({count} records)");
    }
    Ok(())
}

/// Arguments of `metasync add`.
pub struct AddInput {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    pub location: String,
    pub created_at: Option<DateTime<Utc>>,
    pub overwrite: bool,
}

pub async fn add(registry: &StoreRegistry, owner: &str, input: AddInput) -> Result<()> {
    let handle = registry.open(owner).await?;
    let mut record = Record::new(
        owner,
        input.name,
        input.size,
        input.media_type,
        vec![ContentPointer::original(input.location)],
    );
    if let Some(created_at) = input.created_at {
        record = record.with_created_at(created_at);
    }

    let records = handle.records();
    let stored = if input.overwrite {
        records.upsert_overwrite(&record, true)?
    } else {
        match records.insert(&record) {
            Ok(()) => record,
            Err(Error::DuplicateName { name, existing_id }) => anyhow::bail!(
                "'{name}' already exists as record {existing_id}\n\n\
                 Re-run with --overwrite to replace its content"
            ),
            Err(err) => return Err(err.into()),
        }
    };

    ui::print_json(&stored)?;
    wait_for_push(handle.sync(), owner).await;
    Ok(())
}

pub async fn list(registry: &StoreRegistry, owner: &str, limit: u32, offset: u32) -> Result<()> {
    let handle = registry.open(owner).await?;
    let local = handle.records().local();
    let records = local.list(owner, limit, offset)?;
    let total = local.count(owner)?;
    ui::print_records(&records, total);
    Ok(())
}

pub async fn search(
    registry: &StoreRegistry,
    owner: &str,
    pattern: &str,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let handle = registry.open(owner).await?;
    let local = handle.records().local();
    let records = local.search_by_name_pattern(pattern, limit, offset)?;
    let total = local.count_by_name_pattern(pattern)?;
    ui::print_records(&records, total);
    Ok(())
}

pub async fn delete(registry: &StoreRegistry, owner: &str, id: &str) -> Result<()> {
    let handle = registry.open(owner).await?;
    if !handle.records().delete(id)? {
        anyhow::bail!("No record with id {id} for owner '{owner}'");
    }
    println!("Deleted {id}");
    wait_for_push(handle.sync(), owner).await;
    Ok(())
}

async fn wait_for_push(sync: &metasync::SyncCoordinator, owner: &str) {
    if !sync.wait_for_idle(FLUSH_WAIT).await {
        eprintln!("Warning: push for '{owner}' is still pending");
    } else if let Some(err) = sync.status().last_error {
        eprintln!("Warning: push for '{owner}' failed: {err}");
    }
}
