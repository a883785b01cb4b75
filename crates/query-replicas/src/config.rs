//! Settings consumed by the replica set

use crate::error::{ReplicaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Query settings.
///
/// The replica set itself only reads `poll_interval_secs`; the whole struct
/// is passed through to connection pools and to `send_query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound of every readiness wait, in seconds
    pub poll_interval_secs: u64,
    /// How many replicas a pool should hand out for one query
    pub max_parallel_replicas: usize,
    /// Let the pool skip replicas it cannot connect to
    pub skip_unavailable_replicas: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_parallel_replicas: 1,
            skip_unavailable_replicas: false,
        }
    }
}

impl Settings {
    /// Readiness wait bound
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_parallel_replicas == 0 {
            return Err(ReplicaError::Config(
                "max_parallel_replicas must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
