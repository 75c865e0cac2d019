//! Path utilities for metasync data.
//!
//! # Base Directories
//! - [`get_metasync_dir`] - `~/.metasync/` (base directory for all data)
//! - [`get_stores_dir`] - `~/.metasync/stores/` (one directory per owner)
//! - [`get_archive_dir`] - `~/.metasync/archive/` (default filesystem archive)
//!
//! # Owner Files
//! - [`store_path`] - `<data_dir>/stores/<owner>/metadata.db`
//!
//! # Configuration
//! - [`get_config_path`] - `~/.metasync/config.toml`

use crate::constants::{MAX_OWNER_ID_LEN, STORE_FILE_NAME};
use crate::error::{Error, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};

// =============================================================================
// Base Directories
// =============================================================================

/// Get the metasync base directory.
///
/// Resolution order:
/// 1. `METASYNC_HOME` environment variable (if set)
/// 2. `~/.metasync/` (default)
pub fn get_metasync_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("METASYNC_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".metasync"))
}

/// Get the owner stores directory: `~/.metasync/stores/`
pub fn get_stores_dir() -> anyhow::Result<PathBuf> {
    Ok(get_metasync_dir()?.join("stores"))
}

/// Get the default filesystem archive directory: `~/.metasync/archive/`
pub fn get_archive_dir() -> anyhow::Result<PathBuf> {
    Ok(get_metasync_dir()?.join("archive"))
}

// =============================================================================
// Configuration Files
// =============================================================================

/// Get the config file path: `~/.metasync/config.toml`
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    Ok(get_metasync_dir()?.join("config.toml"))
}

// =============================================================================
// Owner Files
// =============================================================================

/// Checks that an owner id is safe to use as a single path component.
///
/// Accepts 1..=128 characters from `[A-Za-z0-9._@-]`, not starting with `.`.
pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.is_empty() {
        return Err(Error::validation("owner id cannot be empty"));
    }
    if owner_id.len() > MAX_OWNER_ID_LEN {
        return Err(Error::validation(format!(
            "owner id longer than {MAX_OWNER_ID_LEN} characters"
        )));
    }
    if owner_id.starts_with('.') {
        return Err(Error::validation(format!(
            "owner id cannot start with '.': {owner_id}"
        )));
    }
    if let Some(bad) = owner_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-')))
    {
        return Err(Error::validation(format!(
            "owner id contains invalid character {bad:?}: {owner_id}"
        )));
    }
    Ok(())
}

/// Deterministic store file location for an owner.
pub fn store_path(data_dir: &Path, owner_id: &str) -> Result<PathBuf> {
    validate_owner_id(owner_id)?;
    Ok(data_dir
        .join("stores")
        .join(owner_id)
        .join(STORE_FILE_NAME))
}
