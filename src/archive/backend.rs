//! Backend trait for the remote archive.

use anyhow::Result;
use async_trait::async_trait;

/// Durable whole-file store keyed by owner id.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Errors are transport failures; an absent entry is not an error.
#[async_trait]
pub trait RemoteArchive: Send + Sync + 'static {
    /// Returns whether the archive holds an entry for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be reached.
    async fn exists(&self, owner_id: &str) -> Result<bool>;

    /// Downloads the owner's store file.
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` - Entry found
    /// * `Ok(None)` - Owner has never been pushed
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails.
    async fn pull(&self, owner_id: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the owner's store file with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails. A failed push leaves the
    /// previous entry in place.
    async fn push(&self, owner_id: &str, bytes: Vec<u8>) -> Result<()>;
}
