//! Configuration module
//!
//! Connection settings for the remote store and the local fallback. Settings
//! can come from a JSON file and are then overridden by command-line flags.
//!
//! Expected JSON format (every key optional):
//! ```json
//! {
//!     "owner": "my-lab",
//!     "repo": "inventory",
//!     "branch": "main",
//!     "data_dir": "data",
//!     "fallback_dir": "public/data",
//!     "max_commit_attempts": 3
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Default API endpoint of the content repository host.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default directory of the table files inside the repository.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default number of read-modify-write attempts per write.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Settings for the remote store and the fallback source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to read and commit to; the repository default when unset.
    pub branch: Option<String>,
    /// Directory of the table files inside the repository.
    pub data_dir: String,
    /// Base URL of the content API.
    pub api_base: String,
    /// Local directory of read-only fallback tables.
    pub fallback_dir: Option<PathBuf>,
    /// Attempts per write before a version conflict is reported.
    pub max_commit_attempts: u32,
    /// Bearer token. Usually supplied through the environment instead.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: None,
            data_dir: DEFAULT_DATA_DIR.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            fallback_dir: None,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            token: None,
        }
    }
}

impl InventoryConfig {
    /// Loads settings from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// True when owner and repository are both set.
    pub fn is_remote_configured(&self) -> bool {
        !self.owner.trim().is_empty() && !self.repo.trim().is_empty()
    }

    /// Checks value ranges and that at least one data source is available.
    pub fn validate(&self) -> Result<()> {
        if self.max_commit_attempts == 0 {
            return Err(InventoryError::InvalidArgument(
                "max_commit_attempts must be at least 1".to_string(),
            ));
        }
        if self.owner.trim().is_empty() != self.repo.trim().is_empty() {
            return Err(InventoryError::InvalidArgument(
                "owner and repo must be given together".to_string(),
            ));
        }
        if !self.is_remote_configured() && self.fallback_dir.is_none() {
            return Err(InventoryError::InvalidArgument(
                "no data source: set owner/repo or a fallback directory".to_string(),
            ));
        }
        Ok(())
    }
}
