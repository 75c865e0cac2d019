//! SQLite-backed local store for one owner.
//!
//! The store file is the unit of sync: the flush worker uploads it whole,
//! and hydration installs a downloaded copy whole. The database keeps
//! SQLite's rollback journal so the main file alone is always a complete,
//! committed snapshot.

use super::types::{Record, format_timestamp, parse_timestamp};
use crate::archive::RemoteArchive;
use crate::constants::SCHEMA_VERSION;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id               TEXT PRIMARY KEY,
        owner_id         TEXT NOT NULL,
        name             TEXT NOT NULL,
        content_pointers TEXT NOT NULL,
        created_at       TEXT,
        ingested_at      TEXT NOT NULL,
        size             INTEGER NOT NULL CHECK (size > 0),
        media_type       TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_records_owner_name ON records (owner_id, name);
    CREATE TABLE IF NOT EXISTS retired_ids (
        id         TEXT PRIMARY KEY,
        retired_at TEXT NOT NULL
    );
";

pub(crate) const RECORD_COLUMNS: &str =
    "id, owner_id, name, content_pointers, created_at, ingested_at, size, media_type";

/// Local embedded table of one owner's records.
///
/// `LocalStore` is `Clone`; clones share one connection behind a mutex.
/// The same mutex guards [`LocalStore::snapshot_bytes`], so a flush never
/// reads the file while a write transaction is open.
#[derive(Clone)]
pub struct LocalStore {
    owner_id: Arc<str>,
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("owner_id", &self.owner_id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Makes sure the owner's store file exists at `path`.
    ///
    /// - Local file present: nothing to do, returns `false`.
    /// - Remote archive has an entry: downloads it, verifies the schema and
    ///   installs it, returns `true`.
    /// - Remote archive has nothing: creates an empty store, returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the archive cannot be reached, the file
    /// cannot be written, or the downloaded copy fails verification (in
    /// which case the partial file is removed).
    pub async fn ensure(path: &Path, owner_id: &str, archive: &dyn RemoteArchive) -> Result<bool> {
        let present = tokio::fs::try_exists(path)
            .await
            .map_err(|e| Error::store(format!("stat {}", path.display()), e))?;
        if present {
            debug!(owner = owner_id, path = %path.display(), "Local store present");
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::store(format!("create {}", parent.display()), e))?;
        }

        let remote = if archive
            .exists(owner_id)
            .await
            .map_err(|e| Error::store("query remote archive", e))?
        {
            archive
                .pull(owner_id)
                .await
                .map_err(|e| Error::store("pull from remote archive", e))?
        } else {
            None
        };

        let target = path.to_path_buf();
        match remote {
            Some(bytes) => {
                let len = bytes.len();
                tokio::task::spawn_blocking(move || install_snapshot(&target, &bytes))
                    .await
                    .map_err(|e| Error::store("hydration task", e))??;
                info!(owner = owner_id, bytes = len, "Hydrated local store from remote archive");
                Ok(true)
            },
            None => {
                tokio::task::spawn_blocking(move || initialize_empty(&target))
                    .await
                    .map_err(|e| Error::store("initialization task", e))??;
                info!(owner = owner_id, "Created empty local store");
                Ok(false)
            },
        }
    }

    /// Opens the store file, initializing the schema if the file is new.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the file cannot be opened or carries an
    /// unexpected schema.
    pub fn open<P: AsRef<Path>>(path: P, owner_id: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::store(format!("create {}", parent.display()), e))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("open {}", path.display()), e))?;
        initialize_schema(&conn)?;
        verify_schema(&conn)?;
        // WAL would leave committed pages outside the main file.
        conn.pragma_update_and_check(None, "journal_mode", "DELETE", |_| Ok(()))?;

        Ok(Self {
            owner_id: Arc::from(owner_id),
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1 AND owner_id = ?2");
        Ok(conn
            .query_row(&sql, params![id, &*self.owner_id], record_from_row)
            .optional()?)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        find_by_name(&conn, &self.owner_id, name)
    }

    /// Records for `owner_id`, newest first by capture time (falling back
    /// to ingest time).
    pub fn list(&self, owner_id: &str, limit: u32, offset: u32) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE owner_id = ?1
             ORDER BY COALESCE(created_at, ingested_at) DESC, id ASC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, limit, offset], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self, owner_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Case-insensitive substring search on names. `%` and `_` in
    /// `pattern` match literally.
    pub fn search_by_name_pattern(
        &self,
        pattern: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND name LIKE ?2 ESCAPE '\\'
             ORDER BY COALESCE(created_at, ingested_at) DESC, id ASC
             LIMIT ?3 OFFSET ?4"
        );
        let like = format!("%{}%", escape_like(pattern));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![&*self.owner_id, like, limit, offset],
            record_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of records [`Self::search_by_name_pattern`] would match
    /// without a limit.
    pub fn count_by_name_pattern(&self, pattern: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let like = format!("%{}%", escape_like(pattern));
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE owner_id = ?1 AND name LIKE ?2 ESCAPE '\\'",
            params![&*self.owner_id, like],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Full contents of the store file, read under the store lock.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        let _guard = self.conn.lock();
        fs::read(&self.path)
            .map_err(|e| Error::store(format!("read {}", self.path.display()), e))
    }
}

pub(crate) fn find_by_name(conn: &Connection, owner_id: &str, name: &str) -> Result<Option<Record>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE owner_id = ?1 AND name = ?2");
    Ok(conn
        .query_row(&sql, params![owner_id, name], record_from_row)
        .optional()?)
}

pub(crate) fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let pointers: String = row.get(3)?;
    let content_pointers = serde_json::from_str(&pointers)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let created_at = row
        .get::<_, Option<String>>(4)?
        .map(|raw| parse_timestamp(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let ingested: String = row.get(5)?;
    let ingested_at = parse_timestamp(&ingested)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    let size: i64 = row.get(6)?;

    Ok(Record {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        content_pointers,
        created_at,
        ingested_at,
        size: u64::try_from(size).unwrap_or_default(),
        media_type: row.get(7)?,
    })
}

/// Column values for a record, in `RECORD_COLUMNS` order.
pub(crate) fn record_params(record: &Record) -> Result<RecordParams> {
    Ok(RecordParams {
        content_pointers: serde_json::to_string(&record.content_pointers)
            .map_err(|e| Error::store("encode content pointers", e))?,
        created_at: record.created_at.as_ref().map(format_timestamp),
        ingested_at: format_timestamp(&record.ingested_at),
        size: i64::try_from(record.size)
            .map_err(|_| Error::validation(format!("record size {} is too large", record.size)))?,
    })
}

pub(crate) struct RecordParams {
    pub content_pointers: String,
    pub created_at: Option<String>,
    pub ingested_at: String,
    pub size: i64,
}

fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != 0 {
        return Ok(());
    }
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )?;
    if tables != 0 {
        // Foreign database without our marker; let verification reject it.
        return Ok(());
    }
    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::store("initialize schema", e))?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn verify_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::store("read schema version", e))?;
    if version != SCHEMA_VERSION {
        return Err(Error::store(
            "verify schema",
            format!("unexpected schema version {version} (expected {SCHEMA_VERSION})"),
        ));
    }
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('records', 'retired_ids')",
        [],
        |row| row.get(0),
    )?;
    if tables != 2 {
        return Err(Error::store(
            "verify schema",
            "store file is missing the records or retired_ids table",
        ));
    }
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Writes downloaded bytes beside `path`, verifies them read-only, then
/// renames them into place.
fn install_snapshot(path: &Path, bytes: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, bytes)
        .map_err(|e| Error::store(format!("write {}", partial.display()), e))?;

    let verified = Connection::open_with_flags(
        &partial,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::store("open downloaded store", e))
    .and_then(|conn| verify_schema(&conn));

    if let Err(e) = verified {
        warn!(path = %partial.display(), error = %e, "Downloaded store failed verification");
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, path).map_err(|e| Error::store(format!("install {}", path.display()), e))
}

fn initialize_empty(path: &Path) -> Result<()> {
    let conn = Connection::open(path)
        .map_err(|e| Error::store(format!("create {}", path.display()), e))?;
    initialize_schema(&conn)?;
    verify_schema(&conn)
}
