//! Configuration management

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            ranking: RankingConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join("drainscope");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Language: "auto", "en", "fr"
    #[serde(default = "default_language")]
    pub language: String,
    /// Seconds between samples taken by the daemon loop
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_secs: u64,
    /// How far back snapshots are retained, in hours
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// IANA zone stamped onto samples by sources that have no better zone
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_language() -> String { "auto".to_string() }
fn default_sampling_interval() -> u64 { 300 }
fn default_retention_hours() -> u64 { 72 }
fn default_timezone() -> String { "UTC".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            sampling_interval_secs: default_sampling_interval(),
            retention_hours: default_retention_hours(),
            timezone: default_timezone(),
        }
    }
}

/// Ranked-list shaping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Maximum entries in one ranked list; overflow folds into the
    /// OS system bucket
    #[serde(default = "default_max_entries")]
    pub max_displayed_entries: usize,
    /// Entries whose rounded share falls below this percent are dropped
    #[serde(default = "default_min_percent")]
    pub min_percent_threshold: f64,
}

fn default_max_entries() -> usize { 20 }
fn default_min_percent() -> f64 { 1.0 }

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_displayed_entries: default_max_entries(),
            min_percent_threshold: default_min_percent(),
        }
    }
}

/// Identity handling and visibility policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Identity keys never shown, even in the show-all view
    #[serde(default)]
    pub hidden_always: Vec<String>,
    /// Identity keys hidden by default, shown in the show-all view
    #[serde(default)]
    pub hidden_by_default: Vec<String>,
    /// Lower bound (inclusive) of the OS-reserved uid range
    #[serde(default)]
    pub os_reserved_id_min: i64,
    /// Upper bound (inclusive) of the OS-reserved uid range
    #[serde(default = "default_os_reserved_max")]
    pub os_reserved_id_max: i64,
    /// Canonical uid every collapsed OS service maps to
    #[serde(default = "default_os_system_id")]
    pub os_system_id: i64,
    /// First synthetic shared-group uid
    #[serde(default = "default_shared_gid_start")]
    pub shared_gid_start: i64,
    /// Last synthetic shared-group uid
    #[serde(default = "default_shared_gid_end")]
    pub shared_gid_end: i64,
    /// Package hints exempt from the OS-range collapse
    #[serde(default = "default_excluded_services")]
    pub excluded_services: Vec<String>,
}

fn default_os_reserved_max() -> i64 { 1_000 }
fn default_os_system_id() -> i64 { 1_000 }
fn default_shared_gid_start() -> i64 { 97_000 }
fn default_shared_gid_end() -> i64 { 99_999 }
fn default_excluded_services() -> Vec<String> { vec!["mediaserver".to_string()] }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hidden_always: Vec::new(),
            hidden_by_default: Vec::new(),
            os_reserved_id_min: 0,
            os_reserved_id_max: default_os_reserved_max(),
            os_system_id: default_os_system_id(),
            shared_gid_start: default_shared_gid_start(),
            shared_gid_end: default_shared_gid_end(),
            excluded_services: default_excluded_services(),
        }
    }
}
