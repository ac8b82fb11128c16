use crate::error::CommonError;
use crate::result::CommonResult;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "trellis.config.json";

/// Runtime configuration file format
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Interpolation plan cache bounds
    #[serde(default)]
    pub plan_cache: PlanCacheConfig,

    /// Scroll restoration cache bounds
    #[serde(default)]
    pub scroll_restore: ScrollRestoreConfig,

    /// Windowed list defaults
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCacheConfig {
    /// Maximum number of cached plans; zero disables caching
    #[serde(default = "default_plan_max_entries")]
    pub max_entries: usize,

    /// Per-plan time to live in milliseconds; zero disables caching
    #[serde(default = "default_plan_ttl_ms")]
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollRestoreConfig {
    #[serde(default = "default_restore_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    #[serde(default = "default_overscan")]
    pub default_overscan: usize,

    #[serde(default = "default_estimated_height")]
    pub default_estimated_height: f64,

    /// Minimum height change (px) that counts as a remeasurement
    #[serde(default = "default_resize_threshold")]
    pub resize_threshold: f64,

    /// Delay used when the host has no frame-aligned scheduling
    #[serde(default = "default_timer_fallback_ms")]
    pub timer_fallback_ms: u64,
}

fn default_plan_max_entries() -> usize {
    256
}

fn default_plan_ttl_ms() -> u64 {
    300_000
}

fn default_restore_capacity() -> usize {
    64
}

fn default_overscan() -> usize {
    3
}

fn default_estimated_height() -> f64 {
    32.0
}

fn default_resize_threshold() -> f64 {
    0.5
}

fn default_timer_fallback_ms() -> u64 {
    16
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_plan_max_entries(),
            ttl_ms: default_plan_ttl_ms(),
        }
    }
}

impl PlanCacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0 && self.ttl_ms > 0
    }
}

impl Default for ScrollRestoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_restore_capacity(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_overscan: default_overscan(),
            default_estimated_height: default_estimated_height(),
            resize_threshold: default_resize_threshold(),
            timer_fallback_ms: default_timer_fallback_ms(),
        }
    }
}

thread_local! {
    static ACTIVE_CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

impl RuntimeConfig {
    /// Load config from a directory, falling back to defaults when absent
    pub fn load(dir: impl AsRef<Path>) -> CommonResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        serde_json::from_str(&content).map_err(|source| CommonError::Config {
            path: config_path,
            source,
        })
    }

    pub fn from_json(json: &str) -> CommonResult<Self> {
        serde_json::from_str(json).map_err(|source| CommonError::Config {
            path: DEFAULT_CONFIG_NAME.into(),
            source,
        })
    }

    /// Make this the configuration returned by `RuntimeConfig::active`
    pub fn install(&self) {
        ACTIVE_CONFIG.with(|active| *active.borrow_mut() = self.clone());
    }

    pub fn active() -> RuntimeConfig {
        ACTIVE_CONFIG.with(|active| active.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "planCache": { "maxEntries": 10, "ttlMs": 500 },
            "scrollRestore": { "capacity": 4 },
            "window": { "defaultOverscan": 5 }
        }"#;

        let config = RuntimeConfig::from_json(json).unwrap();
        assert_eq!(config.plan_cache.max_entries, 10);
        assert_eq!(config.plan_cache.ttl_ms, 500);
        assert_eq!(config.scroll_restore.capacity, 4);
        assert_eq!(config.window.default_overscan, 5);
        assert_eq!(config.window.default_estimated_height, 32.0);
    }

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(config.plan_cache.is_enabled());
        assert_eq!(config.plan_cache.max_entries, 256);
        assert_eq!(config.window.resize_threshold, 0.5);
    }

    #[test]
    fn test_zero_bound_disables_plan_cache() {
        let config = RuntimeConfig::from_json(r#"{ "planCache": { "ttlMs": 0 } }"#).unwrap();
        assert!(!config.plan_cache.is_enabled());
        assert_eq!(config.plan_cache.max_entries, 256);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, CommonError::Config { .. }));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RuntimeConfig::load("/definitely/not/a/trellis/dir").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_install_sets_active() {
        let mut config = RuntimeConfig::default();
        config.window.default_overscan = 9;
        config.install();
        assert_eq!(RuntimeConfig::active().window.default_overscan, 9);
        RuntimeConfig::default().install();
    }
}
