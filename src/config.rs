// Oryx Runtime Configuration
// Loaded from JSON (oryx.json) with environment overrides

use crate::error::{ErrorKind, OryxError, OryxResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "ORYX_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// env_logger filter string ("warn", "oryx_core=debug", ...)
    pub log_filter: String,
    /// Partitions of this length or shorter are insertion sorted
    pub sort_insertion_cutoff: usize,
    /// Object count before the first automatic collection
    pub gc_initial_threshold: usize,
    pub gc_grow_factor: f64,
    /// Stack size for activities spawned by START
    pub activity_stack_size: usize,
    /// Log every dispatch decision at trace level
    pub trace_dispatch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
            sort_insertion_cutoff: 7,
            gc_initial_threshold: 10000,
            gc_grow_factor: 1.5,
            activity_stack_size: 2 * 1024 * 1024,
            trace_dispatch: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(content: &str) -> OryxResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(content).map_err(|e| {
            OryxError::new(ErrorKind::Config, format!("Invalid runtime config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file and apply environment overrides
    pub fn load(path: &Path) -> OryxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OryxError::new(
                ErrorKind::Config,
                format!("Failed to read config '{}': {}", path.display(), e),
            )
        })?;
        let mut config = Self::from_json_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.is_empty() {
                self.log_filter = filter;
            }
        }
    }

    pub fn to_json(&self) -> OryxResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| OryxError::new(ErrorKind::Config, e.to_string()))
    }

    fn validate(&self) -> OryxResult<()> {
        if self.sort_insertion_cutoff == 0 {
            return Err(OryxError::new(ErrorKind::Config, "sortInsertionCutoff must be at least 1"));
        }
        if self.gc_grow_factor < 1.0 {
            return Err(OryxError::new(ErrorKind::Config, "gcGrowFactor must be at least 1.0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.sort_insertion_cutoff, 7);
        assert_eq!(config.gc_initial_threshold, 10000);
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "traceDispatch": true, "logFilter": "debug" }"#).unwrap();
        assert!(config.trace_dispatch);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.sort_insertion_cutoff, 7);
    }

    #[test]
    fn test_invalid_json() {
        let err = RuntimeConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_rejects_zero_cutoff() {
        let err = RuntimeConfig::from_json_str(r#"{ "sortInsertionCutoff": 0 }"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RuntimeConfig::default();
        let text = config.to_json().unwrap();
        assert_eq!(RuntimeConfig::from_json_str(&text).unwrap(), config);
    }
}
