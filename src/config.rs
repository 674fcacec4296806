//! Configuration for the archive.
//!
//! Covers the on-disk layout (archive directory, database file, media
//! directory), listing defaults, and the VFS cache tuning knobs. Loaded
//! from a TOML file; every field has a default so partial files parse.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Archive configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Storage layout settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Listing and pagination defaults.
    #[serde(default)]
    pub listing: ListingConfig,
    /// VFS cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ArchiveConfig {
    /// Load configuration from the default location.
    ///
    /// Returns defaults when no config file exists.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VaultError::io(format!("failed to read config file: {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| VaultError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VaultError::io(
                    format!("failed to create config directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| VaultError::InvalidConfig {
            message: format!("failed to serialize config: {e}"),
        })?;

        std::fs::write(path, content).map_err(|e| {
            VaultError::io(format!("failed to write config file: {}", path.display()), e)
        })?;

        Ok(())
    }
}

/// Storage layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Archive root directory. Defaults to the platform data dir.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Database file name inside the archive root.
    #[serde(default = "default_db_file")]
    pub database_file: String,
    /// Media subdirectory name inside the archive root.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
    /// Views subdirectory name inside the archive root.
    #[serde(default = "default_views_dir")]
    pub views_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            database_file: default_db_file(),
            media_dir: default_media_dir(),
            views_dir: default_views_dir(),
        }
    }
}

impl StorageConfig {
    /// Resolve the archive root directory.
    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chatvault")
        })
    }
}

/// Listing and pagination defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Default page size for keyset pagination.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Truncate content previews at this many characters.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// VFS cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the directory cache.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum adaptive TTL in seconds.
    #[serde(default = "default_min_ttl")]
    pub min_ttl_secs: f64,
    /// Maximum adaptive TTL in seconds.
    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ttl_secs: default_min_ttl(),
            max_ttl_secs: default_max_ttl(),
        }
    }
}

/// Get the default configuration file path.
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| VaultError::InvalidConfig {
        message: "cannot determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join("chatvault").join("config.toml"))
}

fn default_db_file() -> String {
    "conversations.db".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_views_dir() -> String {
    "views".to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_preview_chars() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_min_ttl() -> f64 {
    5.0
}

fn default_max_ttl() -> f64 {
    60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArchiveConfig::default();
        assert_eq!(config.storage.database_file, "conversations.db");
        assert_eq!(config.listing.page_size, 50);
        assert!(config.cache.enabled);
        assert!((config.cache.min_ttl_secs - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_parses() {
        let config: ArchiveConfig = toml::from_str("[listing]\npage_size = 10\n").unwrap();
        assert_eq!(config.listing.page_size, 10);
        assert_eq!(config.storage.media_dir, "media");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ArchiveConfig::default();
        config.listing.page_size = 25;
        config.save_to(&path).unwrap();

        let loaded = ArchiveConfig::load_from(&path).unwrap();
        assert_eq!(loaded.listing.page_size, 25);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [valid").unwrap();

        assert!(ArchiveConfig::load_from(&path).is_err());
    }
}
