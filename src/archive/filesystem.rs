//! Filesystem-backed archive.
//!
//! Each owner's entry is `<base_dir>/<owner_id>.db`. Writes go to a temp
//! file in the same directory and are renamed into place, so a reader never
//! sees a half-written entry.

use super::backend::RemoteArchive;
use crate::paths::validate_owner_id;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory-backed archive.
#[derive(Clone, Debug)]
pub struct FilesystemArchive {
    base_dir: PathBuf,
}

impl FilesystemArchive {
    /// Opens (creating if needed) the archive directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create archive directory: {}", base_dir.display())
        })?;
        Ok(Self { base_dir })
    }

    fn entry_path(&self, owner_id: &str) -> Result<PathBuf> {
        validate_owner_id(owner_id)?;
        Ok(self.base_dir.join(format!("{owner_id}.db")))
    }

    fn pull_sync(&self, owner_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(owner_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read archive entry: {}", path.display()))
            },
        }
    }

    fn push_sync(&self, owner_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.entry_path(owner_id)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.base_dir)
            .context("Failed to create archive temp file")?;
        tmp.write_all(bytes)
            .context("Failed to write archive temp file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync archive temp file")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace archive entry: {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl RemoteArchive for FilesystemArchive {
    async fn exists(&self, owner_id: &str) -> Result<bool> {
        let path = self.entry_path(owner_id)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat archive entry: {}", path.display()))
    }

    async fn pull(&self, owner_id: &str) -> Result<Option<Vec<u8>>> {
        let archive = self.clone();
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || archive.pull_sync(&owner_id))
            .await
            .context("Task join error")?
    }

    async fn push(&self, owner_id: &str, bytes: Vec<u8>) -> Result<()> {
        let archive = self.clone();
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || archive.push_sync(&owner_id, &bytes))
            .await
            .context("Task join error")?
    }
}
