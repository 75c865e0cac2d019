//! Validated, collision-aware mutations over a [`LocalStore`].

use super::local::{LocalStore, find_by_name, record_params};
use super::types::{CollisionSummary, Record, format_timestamp};
use super::validation::validate_record;
use crate::collision::CollisionCache;
use crate::error::{Error, Result};
use crate::sync::SyncCoordinator;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Arc;
use tracing::debug;

/// CRUD and overwrite operations for one owner's records.
///
/// Mutations run synchronously on the caller. After each successful write
/// the owner's cached probe results are dropped and a flush is scheduled;
/// neither step blocks.
#[derive(Clone, Debug)]
pub struct RecordStore {
    local: LocalStore,
    sync: Option<Arc<SyncCoordinator>>,
    cache: Option<Arc<CollisionCache>>,
}

impl RecordStore {
    pub fn new(local: LocalStore) -> Self {
        Self {
            local,
            sync: None,
            cache: None,
        }
    }

    /// Schedules a flush on `sync` after every successful mutation.
    #[must_use]
    pub fn with_sync(mut self, sync: Arc<SyncCoordinator>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Invalidates this owner's entries in `cache` after every successful mutation.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CollisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn owner_id(&self) -> &str {
        self.local.owner_id()
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        self.local.get(id)
    }

    /// Inserts a record, or rewrites every field of the record with the
    /// same id.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed record, a foreign owner, or
    ///   an id that belonged to a deleted record
    /// - [`Error::DuplicateName`] if another record already holds the name
    pub fn insert(&self, record: &Record) -> Result<()> {
        self.check(record)?;
        let values = record_params(record)?;

        let updated = self.local.with_conn(|conn| {
            let tx = conn.transaction()?;

            if is_retired(&tx, &record.id)? {
                return Err(Error::validation(format!(
                    "record id {} belonged to a deleted record and cannot be reused",
                    record.id
                )));
            }
            ensure_name_free(&tx, &record.owner_id, &record.name, &record.id)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1)",
                [&record.id],
                |row| row.get(0),
            )?;

            if exists {
                tx.execute(
                    "UPDATE records
                     SET name = ?2, content_pointers = ?3,
                         created_at = COALESCE(created_at, ?4),
                         ingested_at = ?5, size = ?6, media_type = ?7
                     WHERE id = ?1",
                    params![
                        record.id,
                        record.name,
                        values.content_pointers,
                        values.created_at,
                        values.ingested_at,
                        values.size,
                        record.media_type,
                    ],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO records
                     (id, owner_id, name, content_pointers, created_at, ingested_at, size, media_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        record.id,
                        record.owner_id,
                        record.name,
                        values.content_pointers,
                        values.created_at,
                        values.ingested_at,
                        values.size,
                        record.media_type,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(exists)
        })?;

        debug!(
            owner = self.owner_id(),
            id = %record.id,
            name = %record.name,
            updated,
            "Record stored"
        );
        self.after_mutation();
        Ok(())
    }

    /// Overwrites an existing record with the content of `record`.
    ///
    /// With `preserve_creation`, the target is the present record named
    /// `record.name`: its id and `created_at` are kept while the content
    /// pointers, size, media type and ingest time are replaced. Without it,
    /// the target is the record with id `record.id`, whose fields are all
    /// replaced except an already-set `created_at`.
    ///
    /// Returns the record as stored.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no target to overwrite
    /// - [`Error::Validation`] / [`Error::DuplicateName`] as for [`Self::insert`]
    pub fn upsert_overwrite(&self, record: &Record, preserve_creation: bool) -> Result<Record> {
        self.check(record)?;
        let values = record_params(record)?;
        let owner_id = self.owner_id().to_string();

        let stored = self.local.with_conn(|conn| {
            let tx = conn.transaction()?;

            let target_id = if preserve_creation {
                let existing = find_by_name(&tx, &owner_id, &record.name)?
                    .ok_or_else(|| Error::not_found(&owner_id, format!("name '{}'", record.name)))?;
                tx.execute(
                    "UPDATE records
                     SET content_pointers = ?2, size = ?3, media_type = ?4, ingested_at = ?5
                     WHERE id = ?1",
                    params![
                        existing.id,
                        values.content_pointers,
                        values.size,
                        record.media_type,
                        values.ingested_at,
                    ],
                )?;
                existing.id
            } else {
                ensure_name_free(&tx, &owner_id, &record.name, &record.id)?;
                let changed = tx.execute(
                    "UPDATE records
                     SET name = ?3, content_pointers = ?4,
                         created_at = COALESCE(created_at, ?5),
                         ingested_at = ?6, size = ?7, media_type = ?8
                     WHERE id = ?1 AND owner_id = ?2",
                    params![
                        record.id,
                        owner_id,
                        record.name,
                        values.content_pointers,
                        values.created_at,
                        values.ingested_at,
                        values.size,
                        record.media_type,
                    ],
                )?;
                if changed == 0 {
                    return Err(Error::not_found(&owner_id, format!("id {}", record.id)));
                }
                record.id.clone()
            };

            tx.commit()?;
            Ok(target_id)
        })?;

        let stored = self
            .local
            .get(&stored)?
            .ok_or_else(|| Error::not_found(self.owner_id(), format!("id {stored}")))?;

        debug!(
            owner = self.owner_id(),
            id = %stored.id,
            name = %stored.name,
            preserve_creation,
            "Record overwritten"
        );
        self.after_mutation();
        Ok(stored)
    }

    /// Deletes a record by id. Its id is retired and never accepted again.
    ///
    /// Returns `Ok(true)` if a record was removed; only then is a flush
    /// scheduled.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let owner_id = self.owner_id().to_string();
        let removed = self.local.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM records WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )? > 0;
            if removed {
                tx.execute(
                    "INSERT OR IGNORE INTO retired_ids (id, retired_at) VALUES (?1, ?2)",
                    params![id, format_timestamp(&Utc::now())],
                )?;
            }
            tx.commit()?;
            Ok(removed)
        })?;

        if removed {
            debug!(owner = %owner_id, id, "Record deleted");
            self.after_mutation();
        }
        Ok(removed)
    }

    /// Summary of the present record holding `name`, if any.
    pub fn find_collision(&self, name: &str) -> Result<Option<CollisionSummary>> {
        Ok(self.local.find_by_name(name)?.map(|r| r.summary()))
    }

    fn check(&self, record: &Record) -> Result<()> {
        validate_record(record)?;
        if record.owner_id != self.owner_id() {
            return Err(Error::validation(format!(
                "record owner '{}' does not match store owner '{}'",
                record.owner_id,
                self.owner_id()
            )));
        }
        Ok(())
    }

    fn after_mutation(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_owner(self.owner_id());
        }
        if let Some(sync) = &self.sync {
            sync.schedule_flush();
        }
    }
}

fn is_retired(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM retired_ids WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Fails if a record other than `id` already holds `name`.
fn ensure_name_free(conn: &Connection, owner_id: &str, name: &str, id: &str) -> Result<()> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT id FROM records WHERE owner_id = ?1 AND name = ?2",
            params![owner_id, name],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(existing_id) if existing_id != id => Err(Error::DuplicateName {
            name: name.to_string(),
            existing_id,
        }),
        _ => Ok(()),
    }
}
