//! Store configuration types

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::location::host_problem;
use crate::{Error, Result};

/// Bytes per megabyte used when converting `chunk_size_mb`
const MB: u64 = 1024 * 1024;

/// Largest accepted `chunk_size_mb`; each chunk is held in memory while written
pub const MAX_CHUNK_SIZE_MB: u64 = 1024;

/// Sheepdog store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Address of the sheep daemon the control tool talks to
    pub address: String,

    /// Port of the sheep daemon
    pub port: u16,

    /// Size of each write issued to a volume, in megabytes
    pub chunk_size_mb: u64,

    /// Control tool binary (`collie` or `dog`)
    pub tool: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 7000,
            chunk_size_mb: 64,
            tool: "collie".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The result is validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: StoreConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "Loaded store configuration");
        Ok(config)
    }

    /// Write chunk size in bytes, capped at [`MAX_CHUNK_SIZE_MB`]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size_mb.min(MAX_CHUNK_SIZE_MB) * MB
    }

    /// Check that every field needed to reach the cluster is usable
    pub fn validate(&self) -> Result<()> {
        if let Some(reason) = host_problem(&self.address) {
            return Err(Error::InvalidConfig {
                message: format!("address {:?} is not usable: {reason}", self.address),
            });
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig {
                message: "port must be non-zero".to_string(),
            });
        }
        if self.chunk_size_mb == 0 {
            return Err(Error::InvalidConfig {
                message: "chunk_size_mb must be greater than zero".to_string(),
            });
        }
        let fits = self.chunk_size_mb.checked_mul(MB).is_some();
        if !fits || self.chunk_size_mb > MAX_CHUNK_SIZE_MB {
            return Err(Error::InvalidConfig {
                message: format!(
                    "chunk_size_mb must be at most {MAX_CHUNK_SIZE_MB}, got {}",
                    self.chunk_size_mb
                ),
            });
        }
        if self.tool.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "tool must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
