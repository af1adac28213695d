//! Settings for the host core.

use crate::error::{Error, Result};
use crate::latency::LatencySettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every host the driver creates.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub latency: LatencySettings,
    /// Copy token ownership from system tables into each host.
    pub use_tokens: bool,
}

impl CoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}
