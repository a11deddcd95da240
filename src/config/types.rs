use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHECKPOINT_PATH: &str = "/var/lib/gkle/last";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory gatekeeper rotates its logs into.
    pub gk_log_dir: PathBuf,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Overrides the measurement line grammar.
    #[serde(default)]
    pub log_line_regex: Option<String>,
    #[serde(default)]
    pub on_missing_watermark: MissingWatermarkStrategy,
    #[serde(default = "default_drain_on_startup")]
    pub drain_on_startup: bool,
    pub influxdb: InfluxConfig,
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_PATH)
}

fn default_drain_on_startup() -> bool {
    true
}

/// What to do when the checkpointed file is gone from the log directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingWatermarkStrategy {
    /// Process the files rotated after the missing one.
    #[default]
    ResumeAfter,
    /// Process every retained file again.
    ReprocessAll,
    /// Refuse to process anything until an operator intervenes.
    Halt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub retention_policy: String,
    /// Value of the `host` tag. Defaults to the machine hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Client log level of older exporter releases. Accepted so existing
    /// config files keep loading; logging is controlled by `RUST_LOG`.
    #[serde(default, skip_serializing)]
    pub log_level: Option<u32>,
}

fn default_measurement() -> String {
    "gkle".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
