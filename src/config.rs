use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Tuning knobs for the engine's long-running loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes moved per copy-forward step during a rebuild commit
    pub copy_chunk_size: usize,
    /// Largest output a rebuild keeps in memory before spilling to a temp file
    pub memory_threshold: u64,
    /// Block size for find scans
    pub find_block_size: usize,
    /// Block size for histogram scans
    pub histogram_block_size: usize,
    /// Iterations between progress notifications
    pub progress_interval: usize,
    pub undo_enabled: bool,
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Zero-sized blocks would stall every loop, so clamp them to 1.
    pub fn sanitized(mut self) -> Self {
        self.copy_chunk_size = self.copy_chunk_size.max(1);
        self.find_block_size = self.find_block_size.max(1);
        self.histogram_block_size = self.histogram_block_size.max(1);
        self.progress_interval = self.progress_interval.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            copy_chunk_size: 64 * 1024,
            memory_threshold: 64 * 1024 * 1024,
            find_block_size: 64 * 1024,
            histogram_block_size: 1024 * 1024,
            progress_interval: 256,
            undo_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"copy_chunk_size": 16}"#).unwrap();
        assert_eq!(config.copy_chunk_size, 16);
        assert_eq!(config.memory_threshold, EngineConfig::default().memory_threshold);
        assert!(config.undo_enabled);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let config =
            EngineConfig::from_json(r#"{"find_block_size": 0, "progress_interval": 0}"#).unwrap();
        assert_eq!(config.find_block_size, 1);
        assert_eq!(config.progress_interval, 1);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Config(_)));
    }
}
