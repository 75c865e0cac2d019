//! Configuration for metasync.
//!
//! [`Settings`] is loaded from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working configuration:
//!
//! ```toml
//! sync_enabled = true
//! cache_ttl_secs = 300
//! collision_batch_size = 50
//! max_retries = 3
//! base_retry_delay_secs = 1.0
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::paths;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Runtime settings for stores, sync and collision probing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether mutations schedule pushes to the remote archive.
    pub sync_enabled: bool,
    /// Lifetime of a cached probe result.
    pub cache_ttl_secs: u64,
    /// Names per chunk in `probe_batched`.
    pub collision_batch_size: usize,
    /// Total probe attempts before `RecoveryFailed`.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_retry_delay_secs: f64,
    /// Cap on a single backoff sleep.
    pub max_retry_delay_secs: f64,
    /// Coalescing window for flush triggers.
    pub flush_debounce_ms: u64,
    /// Parallel lookups inside one probe batch.
    pub probe_concurrency: usize,
    /// Collision cache capacity.
    pub cache_max_entries: usize,
    /// Root for per-owner store files. Defaults to `~/.metasync`.
    pub data_dir: Option<PathBuf>,
    /// Directory used by the filesystem archive. Defaults to `~/.metasync/archive`.
    pub archive_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_enabled: constants::DEFAULT_SYNC_ENABLED,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL_SECS,
            collision_batch_size: constants::DEFAULT_COLLISION_BATCH_SIZE,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            base_retry_delay_secs: constants::DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay_secs: constants::DEFAULT_MAX_RETRY_DELAY_SECS,
            flush_debounce_ms: constants::DEFAULT_FLUSH_DEBOUNCE_MS,
            probe_concurrency: constants::DEFAULT_PROBE_CONCURRENCY,
            cache_max_entries: constants::DEFAULT_CACHE_MAX_ENTRIES,
            data_dir: None,
            archive_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Load from `path` if given, else from `~/.metasync/config.toml` when it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        let default_path = paths::get_config_path()?;
        if default_path.exists() {
            Self::load_from(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate settings.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every invalid field.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.cache_ttl_secs == 0 {
            errors.push("cache_ttl_secs cannot be 0 (default: 300)".to_string());
        } else if self.cache_ttl_secs > 3600 {
            warnings.push(format!(
                "cache_ttl_secs {} is longer than an hour\n  \
                 Stale probe results survive until invalidated by a write",
                self.cache_ttl_secs
            ));
        }

        if self.collision_batch_size == 0 {
            errors.push("collision_batch_size cannot be 0 (default: 50)".to_string());
        }

        if self.max_retries == 0 {
            errors.push("max_retries must allow at least one attempt (default: 3)".to_string());
        } else if self.max_retries > 10 {
            warnings.push(format!(
                "max_retries {} with exponential backoff can block an upload for a long time",
                self.max_retries
            ));
        }

        if !self.base_retry_delay_secs.is_finite() || self.base_retry_delay_secs < 0.0 {
            errors.push(format!(
                "base_retry_delay_secs must be a non-negative number (got: {})",
                self.base_retry_delay_secs
            ));
        }

        if !self.max_retry_delay_secs.is_finite()
            || self.max_retry_delay_secs < self.base_retry_delay_secs
        {
            errors.push(format!(
                "max_retry_delay_secs ({}) must be >= base_retry_delay_secs ({})",
                self.max_retry_delay_secs, self.base_retry_delay_secs
            ));
        }

        if self.probe_concurrency == 0 {
            errors.push("probe_concurrency cannot be 0 (default: 8)".to_string());
        }

        if self.cache_max_entries == 0 {
            errors.push("cache_max_entries cannot be 0 (default: 1024)".to_string());
        }

        if !self.sync_enabled {
            warnings.push(
                "sync_enabled = false: local changes will not reach the remote archive".to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_retry_delay_secs.max(0.0))
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_retry_delay_secs.max(0.0))
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    /// Resolved data directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::get_metasync_dir(),
        }
    }

    /// Resolved filesystem archive directory.
    pub fn resolve_archive_dir(&self) -> Result<PathBuf> {
        match &self.archive_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::get_archive_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert!(settings.sync_enabled);
        assert_eq!(settings.cache_ttl_secs, 300);
        assert_eq!(settings.collision_batch_size, 50);
        assert_eq!(settings.max_retries, 3);
        assert!((settings.base_retry_delay_secs - 1.0).abs() < f64::EPSILON);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_overrides() {
        let toml_str = r#"
sync_enabled = false
cache_ttl_secs = 60
collision_batch_size = 10
max_retries = 5
base_retry_delay_secs = 0.25
data_dir = "/var/lib/metasync"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(!settings.sync_enabled);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.collision_batch_size, 10);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.base_retry_delay(), Duration::from_millis(250));
        assert_eq!(
            settings.resolve_data_dir().unwrap(),
            PathBuf::from("/var/lib/metasync")
        );
    }

    #[test]
    fn test_validate_batch_size_zero() {
        let settings = Settings {
            collision_batch_size: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("collision_batch_size cannot be 0"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let settings = Settings {
            cache_ttl_secs: 0,
            max_retries: 0,
            base_retry_delay_secs: -1.0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("cache_ttl_secs"));
        assert!(err.contains("max_retries"));
        assert!(err.contains("base_retry_delay_secs"));
    }

    #[test]
    fn test_validate_warns_when_sync_disabled() {
        let settings = Settings {
            sync_enabled: false,
            ..Default::default()
        };
        let result = settings.validate().unwrap();
        assert!(result.has_warnings());
        assert!(result.warnings[0].contains("sync_enabled"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retries = 7\n").unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.collision_batch_size, 50);
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retries = \"many\"\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }
}
