//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Runtime settings for the message engine.
///
/// Every field has a default, so a partial (or missing) configuration file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path of the `SQLite` database file.
    pub database_path: String,
    /// Page size used when a listing request carries no usable limit.
    pub page_size_default: u32,
    /// Largest accepted page size.
    pub page_size_max: u32,
    /// Lifetime of presigned avatar URLs, in seconds.
    pub avatar_url_ttl_secs: u64,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "mailroom.db".to_string(),
            page_size_default: 20,
            page_size_max: 100,
            avatar_url_ttl_secs: 15 * 60,
            log_filter: "mailroom=info,mailroom_core=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// page size bounds are inconsistent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.page_size_max == 0 {
            return Err(crate::Error::Config("page_size_max must be positive".into()));
        }
        if self.page_size_default == 0 || self.page_size_default > self.page_size_max {
            return Err(crate::Error::Config(format!(
                "page_size_default must be within 1..={}",
                self.page_size_max
            )));
        }
        Ok(())
    }

    /// Presigned URL lifetime as a [`std::time::Duration`].
    #[must_use]
    pub const fn avatar_url_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.avatar_url_ttl_secs)
    }
}
