//! pipeline configuration: environment variables layered over an optional
//! JSON secrets file. components never read the environment themselves;
//! the orchestrator threads this struct down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::EtlError;

/// environment variables are read with this prefix, e.g.
/// `RAILDELAY_API_USER`
pub const ENV_PREFIX: &str = "RAILDELAY";

/// basename of the optional secrets file (`secret.json`)
pub const SECRETS_FILE: &str = "secret";

const KNOWN_KEYS: [&str; 13] = [
    "api_user",
    "api_password",
    "api_base_url",
    "gtfs_index_url",
    "data_dir",
    "stations_file",
    "max_per_minute",
    "cycle_time_sec",
    "stop_time_sec",
    "retry_timeout_sec",
    "median_window_sec",
    "snapshot_bucket",
    "training_bucket",
];

#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    #[serde(default)]
    pub api_user: String,
    #[serde(default)]
    pub api_password: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gtfs_index_url")]
    pub gtfs_index_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// CSV file of 8-digit station codes; defaults to
    /// `<data_dir>/all_stations.csv`
    #[serde(default)]
    pub stations_file: Option<PathBuf>,
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,
    #[serde(default = "default_cycle_time_sec")]
    pub cycle_time_sec: u64,
    #[serde(default = "default_stop_time_sec")]
    pub stop_time_sec: u64,
    #[serde(default = "default_retry_timeout_sec")]
    pub retry_timeout_sec: u64,
    #[serde(default = "default_median_window_sec")]
    pub median_window_sec: i64,
    #[serde(default)]
    pub snapshot_bucket: Option<String>,
    #[serde(default)]
    pub training_bucket: Option<String>,
}

fn default_api_base_url() -> String {
    String::from("http://api.transilien.com")
}

fn default_gtfs_index_url() -> String {
    String::from(
        "https://ressources.data.sncf.com/explore/dataset/sncf-transilien-gtfs/download/?format=csv",
    )
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_per_minute() -> u32 {
    300
}

fn default_cycle_time_sec() -> u64 {
    1200
}

fn default_stop_time_sec() -> u64 {
    3500
}

fn default_retry_timeout_sec() -> u64 {
    20
}

fn default_median_window_sec() -> i64 {
    1200
}

impl Default for EtlConfig {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).expect("empty config deserializes")
    }
}

impl EtlConfig {
    /// loads configuration: environment (prefixed) over the optional
    /// `secret.json` file in the working directory. unknown keys are
    /// reported with a warning and otherwise ignored.
    pub fn load() -> Result<EtlConfig, EtlError> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name(SECRETS_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .map_err(|e| EtlError::Configuration(e.to_string()))?;
        warn_unknown_keys(&raw);
        raw.try_deserialize()
            .map_err(|e| EtlError::Configuration(e.to_string()))
    }

    pub fn schedule_db_path(&self) -> PathBuf {
        self.data_dir.join("schedules.db")
    }

    pub fn realtime_db_path(&self) -> PathBuf {
        self.data_dir.join("realtime-passages")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.data_dir.join("training_sets")
    }

    /// the 8-digit station codes to poll, from the configured stations
    /// file or `<data_dir>/all_stations.csv`
    pub fn station_ids(&self) -> Result<Vec<String>, EtlError> {
        let path = self
            .stations_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("all_stations.csv"));
        read_station_file(&path)
    }

    /// polling needs vendor credentials; everything else runs without them
    pub fn validate_for_polling(&self) -> Result<(), EtlError> {
        if self.api_user.is_empty() {
            return Err(EtlError::Configuration(String::from(
                "api_user is not set (environment or secret.json)",
            )));
        }
        Ok(())
    }
}

fn warn_unknown_keys(raw: &config::Config) {
    if let Ok(map) = raw.clone().try_deserialize::<HashMap<String, config::Value>>() {
        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                log::warn!("unknown configuration key '{key}' ignored");
            }
        }
    }
}

fn read_station_file(path: &Path) -> Result<Vec<String>, EtlError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EtlError::Configuration(format!("cannot read station list {}: {e}", path.display()))
    })?;
    let stations: Vec<String> = content
        .split([',', '\n', '\r'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if stations.is_empty() {
        return Err(EtlError::Configuration(format!(
            "station list {} is empty",
            path.display()
        )));
    }
    Ok(stations)
}
