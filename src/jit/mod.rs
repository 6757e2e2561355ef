//! Speculative spread-call tier
//!
//! Sole-spread call sites (`f(...x)`) are profiled while they run on the
//! baseline path. Hot sites with a stable argument shape get a fast path that
//! reads array elements directly. The fast path is guarded per call and
//! invalidated by the monitor when the iteration protocol is modified.

mod guards;
mod monitor;
mod optimizer;

pub use guards::{check_guards, check_shape, try_fast_path, Guard, GuardSet};
pub use monitor::{
    InvalidationEvent, InvalidationMonitor, InvalidationReason, WatchedSlot, WriteKind,
};
pub use optimizer::{
    CallSiteRecord, CallSiteState, SpreadCallOptimizer, SpreadPath, ARRAY_ITERATOR_SLOT,
    ITERATOR_NEXT_SLOT,
};

use crate::bytecode::CallSiteId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Consecutive eligible calls before a site is optimized
pub const DEFAULT_WARMUP_THRESHOLD: u32 = 1000;

/// Invalidations after which a site stays on the baseline path
pub const DEFAULT_MAX_DEOPTS: u32 = 5;

/// Optimizer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Whether sites may be optimized at all
    pub enabled: bool,
    /// Consecutive fast-eligible calls needed to optimize a site
    pub warmup_threshold: u32,
    /// Invalidations after which a site is never re-optimized
    pub max_deopts: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_threshold: DEFAULT_WARMUP_THRESHOLD,
            max_deopts: DEFAULT_MAX_DEOPTS,
        }
    }
}

impl OptimizerConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the warm-up threshold
    pub fn with_warmup_threshold(mut self, threshold: u32) -> Self {
        self.warmup_threshold = threshold;
        self
    }

    /// Set the maximum deoptimization count
    pub fn with_max_deopts(mut self, max: u32) -> Self {
        self.max_deopts = max;
        self
    }

    /// Reject settings the optimizer cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.warmup_threshold == 0 {
            return Err(Error::ConfigError(
                "warmup_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("invalid optimizer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Snapshot of one call site for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteStats {
    pub id: CallSiteId,
    pub line: u32,
    pub label: String,
    pub state: &'static str,
    pub calls: u64,
    pub fast_path_hits: u64,
    pub baseline_calls: u64,
    pub guard_failures: u64,
    pub optimizations: u32,
    pub deopts: u32,
    pub optimized_at_call: Option<u64>,
}

/// Optimizer statistics, printed by `--stats` and `.stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizerStats {
    pub enabled: bool,
    pub warmup_threshold: u32,
    pub max_deopts: u32,
    pub epoch: u64,
    pub fuse_intact: bool,
    pub sites: Vec<CallSiteStats>,
    pub invalidations: Vec<InvalidationEvent>,
}

impl OptimizerStats {
    /// Find a site by its source label
    pub fn site(&self, label: &str) -> Option<&CallSiteStats> {
        self.sites.iter().find(|s| s.label == label)
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("failed to serialize stats: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.warmup_threshold, 1000);
        assert_eq!(config.max_deopts, 5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = OptimizerConfig::from_json_str(r#"{ "warmup_threshold": 10 }"#).unwrap();
        assert_eq!(
            config,
            OptimizerConfig::default().with_warmup_threshold(10)
        );
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = OptimizerConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let err = OptimizerConfig::from_json_str(r#"{ "warmup_threshold": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("warmup_threshold"));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opt.json");
        std::fs::write(&path, r#"{ "enabled": false, "max_deopts": 1 }"#).unwrap();
        let config = OptimizerConfig::from_file(&path).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.max_deopts, 1);
        assert_eq!(config.warmup_threshold, DEFAULT_WARMUP_THRESHOLD);
    }
}
