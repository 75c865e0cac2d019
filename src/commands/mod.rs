//! CLI command implementations for metasync.
//!
//! - [`records`] - Store creation, record add/list/search/delete
//! - [`probe`] - Collision checks for candidate names
//! - [`sync`] - Forced push to the archive

pub mod probe;
pub mod records;
pub mod sync;

use anyhow::{Context, Result};
use metasync::{FilesystemArchive, Settings, StoreRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Initialize stderr logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Load settings and build a registry backed by the filesystem archive.
pub fn open_registry(config: Option<&Path>) -> Result<Arc<StoreRegistry>> {
    let settings = Settings::load_or_default(config)?;
    let validation = settings.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let data_dir = settings.resolve_data_dir()?;
    let archive_dir = settings.resolve_archive_dir()?;
    let archive = FilesystemArchive::open(&archive_dir)
        .with_context(|| format!("Failed to open archive at {}", archive_dir.display()))?;

    Ok(Arc::new(StoreRegistry::new(
        settings,
        data_dir,
        Arc::new(archive),
    )))
}
