//! Cache configuration
//!
//! Configuration is plain data: it can be deserialized from a TOML table,
//! adjusted with builder-style setters and overridden from the environment.
//!
//! Environment overrides:
//! - `STAGECACHE_DIR`: cache folder
//! - `STAGECACHE_DISABLE`: `1`/`true` turns caching off
//! - `STAGECACHE_VARIANT_CAPACITY`: variants kept per producer output
//! - `STAGECACHE_ENTRY_CAPACITY`: producer outputs kept in the index

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of variants kept per producer output
pub const DEFAULT_VARIANT_CAPACITY: usize = 3;

/// Default number of producer outputs kept in the index
pub const DEFAULT_ENTRY_CAPACITY: usize = 32;

/// Configuration for a [`crate::CacheIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Folder holding every payload file
    pub cache_folder: PathBuf,
    /// Maximum number of variants per producer output
    pub variant_capacity: usize,
    /// Maximum number of producer outputs
    pub entry_capacity: usize,
    /// Whether insertions are accepted at all
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_folder: default_cache_folder(),
            variant_capacity: DEFAULT_VARIANT_CAPACITY,
            entry_capacity: DEFAULT_ENTRY_CAPACITY,
            enabled: true,
        }
    }
}

/// Default cache folder: the OS cache dir, falling back to the temp dir.
fn default_cache_folder() -> PathBuf {
    dirs::cache_dir()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(std::env::temp_dir)
        .join("stagecache/artifacts")
}

/// Raw override values, as read from the environment
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    cache_dir: Option<String>,
    disable: Option<String>,
    variant_capacity: Option<String>,
    entry_capacity: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|s| !s.trim().is_empty());
        Self {
            cache_dir: var("STAGECACHE_DIR"),
            disable: var("STAGECACHE_DISABLE"),
            variant_capacity: var("STAGECACHE_VARIANT_CAPACITY"),
            entry_capacity: var("STAGECACHE_ENTRY_CAPACITY"),
        }
    }
}

fn parse_capacity(name: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|e| {
        Error::configuration(format!("{name} must be a positive integer, got {raw:?}: {e}"))
    })
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::configuration(format!(
            "{name} must be a boolean flag, got {other:?}"
        ))),
    }
}

impl CacheConfig {
    /// Parse a configuration from a TOML document.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::serialization(format!("Failed to parse cache config: {e}")))
    }

    /// Apply `STAGECACHE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(EnvOverrides::from_env())
    }

    fn apply_overrides(mut self, overrides: EnvOverrides) -> Result<Self> {
        if let Some(dir) = overrides.cache_dir {
            self.cache_folder = PathBuf::from(dir);
        }
        if let Some(raw) = overrides.disable {
            self.enabled = !parse_flag("STAGECACHE_DISABLE", &raw)?;
        }
        if let Some(raw) = overrides.variant_capacity {
            self.variant_capacity = parse_capacity("STAGECACHE_VARIANT_CAPACITY", &raw)?;
        }
        if let Some(raw) = overrides.entry_capacity {
            self.entry_capacity = parse_capacity("STAGECACHE_ENTRY_CAPACITY", &raw)?;
        }
        Ok(self)
    }

    /// Set the cache folder
    #[must_use]
    pub fn with_cache_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.cache_folder = folder.into();
        self
    }

    /// Set the number of variants kept per producer output
    #[must_use]
    pub fn with_variant_capacity(mut self, capacity: usize) -> Self {
        self.variant_capacity = capacity;
        self
    }

    /// Set the number of producer outputs kept in the index
    #[must_use]
    pub fn with_entry_capacity(mut self, capacity: usize) -> Self {
        self.entry_capacity = capacity;
        self
    }

    /// Enable or disable caching
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reject configurations the index cannot honour.
    ///
    /// A zero capacity would leave eviction with nothing to evict.
    pub fn validate(&self) -> Result<()> {
        if self.variant_capacity == 0 {
            return Err(Error::configuration("variant_capacity must be at least 1"));
        }
        if self.entry_capacity == 0 {
            return Err(Error::configuration("entry_capacity must be at least 1"));
        }
        Ok(())
    }
}
