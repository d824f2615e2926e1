//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration. CLI flags override individual values
//! after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ports::{FallbackPolicy, Tool};

/// Keywords that mark a python process as a training job.
pub const DEFAULT_TRAINING_KEYWORDS: &[&str] = &[
    "python",
    "pytorch",
    "tensorflow",
    "torch",
    "cuda",
    "train",
    "training",
    "model",
    "fit",
    "learn",
];

/// Keywords that mark any process as a training job on their own.
pub const DEFAULT_FRAMEWORK_KEYWORDS: &[&str] = &["pytorch", "tensorflow", "torch"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub ports: PortsConfig,
    pub system: SystemConfig,
    pub energy: EnergyConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub primary_tool: Tool,
    pub fallback_tool: Tool,
    pub fallback_policy: FallbackPolicy,
    /// Upper bound on a single `ss`/`netstat` invocation.
    pub command_timeout_ms: u64,
    /// `/etc/services`-format file for service names. `None` uses the
    /// built-in table only.
    pub services_path: Option<PathBuf>,
    /// Interface counters. `None` disables byte accounting.
    pub net_dev_path: Option<PathBuf>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            primary_tool: Tool::Ss,
            fallback_tool: Tool::Netstat,
            fallback_policy: FallbackPolicy::Strict,
            command_timeout_ms: 5_000,
            services_path: Some(PathBuf::from("/etc/services")),
            net_dev_path: Some(PathBuf::from("/proc/net/dev")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    /// Mount point reported under `disk`.
    pub disk_path: PathBuf,
    /// Gap between the two `/proc/stat` samples used for CPU percent.
    pub cpu_sample_ms: u64,
    pub nvidia_smi: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            disk_path: PathBuf::from("/"),
            cpu_sample_ms: 500,
            nvidia_smi: "nvidia-smi".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub price_per_kwh: f64,
    pub currency: String,
    pub cpu_tdp_w: f64,
    pub ram_watts_per_gb: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            price_per_kwh: 15.0,
            currency: "TRY".to_string(),
            cpu_tdp_w: 95.0,
            ram_watts_per_gb: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Matched together with `python`.
    pub keywords: Vec<String>,
    /// Matched on their own.
    pub framework_keywords: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_TRAINING_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            framework_keywords: DEFAULT_FRAMEWORK_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl MonitorConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let price = self.energy.price_per_kwh;
        if !price.is_finite() || price <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "energy.price_per_kwh",
                message: format!("{price} is not a positive number"),
            });
        }
        if !self.energy.cpu_tdp_w.is_finite() || self.energy.cpu_tdp_w < 0.0 {
            return Err(ConfigError::Invalid {
                key: "energy.cpu_tdp_w",
                message: "must be a non-negative number".into(),
            });
        }
        if !self.energy.ram_watts_per_gb.is_finite() || self.energy.ram_watts_per_gb < 0.0 {
            return Err(ConfigError::Invalid {
                key: "energy.ram_watts_per_gb",
                message: "must be a non-negative number".into(),
            });
        }
        if self.ports.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "ports.command_timeout_ms",
                message: "must be greater than zero".into(),
            });
        }
        if self.ports.primary_tool == self.ports.fallback_tool {
            log::warn!(
                "primary and fallback tool are both {}; fallback will retry the same tool",
                self.ports.primary_tool
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.energy.price_per_kwh, 15.0);
        assert_eq!(config.energy.currency, "TRY");
        assert_eq!(config.energy.cpu_tdp_w, 95.0);
        assert_eq!(config.energy.ram_watts_per_gb, 0.5);
        assert_eq!(config.ports.primary_tool, Tool::Ss);
        assert_eq!(config.ports.fallback_tool, Tool::Netstat);
        assert_eq!(config.ports.fallback_policy, FallbackPolicy::Strict);
        assert_eq!(config.system.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.training.keywords.len(), 10);
    }

    #[test]
    fn empty_object_is_default() {
        let config = MonitorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = MonitorConfig::from_json_str(
            r#"{"energy": {"price_per_kwh": 2.5}, "ports": {"fallback_policy": "per_protocol"}}"#,
        )
        .unwrap();
        assert_eq!(config.energy.price_per_kwh, 2.5);
        assert_eq!(config.energy.currency, "TRY");
        assert_eq!(config.ports.fallback_policy, FallbackPolicy::PerProtocol);
        assert_eq!(config.ports.primary_tool, Tool::Ss);
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = MonitorConfig::from_json_str(r#"{"energy": {"price_per_kwh": 0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "energy.price_per_kwh",
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = MonitorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostwatch.json");
        std::fs::write(&path, r#"{"system": {"disk_path": "/data"}}"#).unwrap();
        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.system.disk_path, PathBuf::from("/data"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = MonitorConfig::load(Path::new("/nonexistent/hostwatch.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
