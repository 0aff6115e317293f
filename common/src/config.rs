use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(rename = "beaconcha_in", default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default = "default_logging")]
    pub logging: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Constant labels attached to every exported metric family.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub apikey: String,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidatorSpec {
    pub pubkey: String,
    /// Per-validator label overrides, keyed by label name.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_logging() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_namespace() -> String {
    "eth_validator".to_string()
}

fn default_check_interval_secs() -> u64 {
    86400
}

fn default_endpoint() -> String {
    "https://beaconcha.in".to_string()
}

fn default_max_requests_per_minute() -> u32 {
    10
}

fn default_batch_size() -> usize {
    50
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            logging: default_logging(),
            metrics_addr: default_metrics_addr(),
            namespace: default_namespace(),
            check_interval_secs: default_check_interval_secs(),
            labels: BTreeMap::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            apikey: String::new(),
            max_requests_per_minute: default_max_requests_per_minute(),
            batch_size: default_batch_size(),
        }
    }
}

impl GlobalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Config {
    /// Read and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.check_interval_secs == 0 {
            return Err(ConfigError::InvalidCheckInterval);
        }
        if self.api.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.api.max_requests_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }

        let mut seen = HashSet::new();
        for (index, validator) in self.validators.iter().enumerate() {
            if validator.pubkey.is_empty() {
                return Err(ConfigError::MissingPubkey { index });
            }
            if !seen.insert(validator.pubkey.as_str()) {
                return Err(ConfigError::DuplicatePubkey {
                    index,
                    pubkey: validator.pubkey.clone(),
                });
            }
        }

        Ok(())
    }
}
