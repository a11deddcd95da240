use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use crate::source::parser::LineParser;
use regex::Regex;
use std::fs::File;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a config from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    config.gk_log_dir = expand_tilde(&config.gk_log_dir);
    // Watermarks are paths under gk_log_dir and must stay valid across restarts.
    if config.gk_log_dir.is_relative() && !config.gk_log_dir.as_os_str().is_empty() {
        config.gk_log_dir = std::env::current_dir()?.join(&config.gk_log_dir);
    }
    config.checkpoint_path = expand_tilde(&config.checkpoint_path);

    validate_config(&config)?;

    if let Some(level) = config.influxdb.log_level {
        warn!(
            log_level = level,
            "influxdb.log_level is ignored, set RUST_LOG to control logging"
        );
    }

    if config.influxdb.hostname.as_deref().map_or(true, str::is_empty) {
        config.influxdb.hostname = Some(default_hostname()?);
    }

    Ok(config)
}

fn default_hostname() -> Result<String, ConfigError> {
    let name = hostname::get()?;
    name.into_string()
        .map_err(|_| ConfigError::Validation("machine hostname is not valid UTF-8".to_string()))
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid");
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        unexpanded_vars.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.gk_log_dir.as_os_str().is_empty() {
        errors.push("gk_log_dir cannot be empty".to_string());
    }

    if config.checkpoint_path.as_os_str().is_empty() {
        errors.push("checkpoint_path cannot be empty".to_string());
    }

    if let Some(pattern) = &config.log_line_regex {
        if let Err(e) = LineParser::new(Some(pattern)) {
            errors.push(format!("log_line_regex: {}", e));
        }
    }

    let influx = &config.influxdb;
    if influx.url.is_empty() {
        errors.push("influxdb.url cannot be empty".to_string());
    } else if !influx.url.starts_with("http://") && !influx.url.starts_with("https://") {
        errors.push(format!(
            "influxdb.url '{}' must start with http:// or https://",
            influx.url
        ));
    }
    if influx.user.is_empty() || influx.password.is_empty() || influx.database.is_empty() {
        errors.push(
            "influxdb: user, password and database are required".to_string(),
        );
    }
    if influx.measurement.is_empty() {
        errors.push("influxdb.measurement cannot be empty".to_string());
    }
    if influx.timeout.is_zero() {
        errors.push("influxdb.timeout must be greater than zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    const MINIMAL: &str = r#"
gk_log_dir: /var/log/gatekeeper
influxdb:
  url: http://localhost:8086
  user: gk
  password: secret
  database: gatekeeper
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.gk_log_dir, PathBuf::from("/var/log/gatekeeper"));
        assert_eq!(config.checkpoint_path, PathBuf::from(DEFAULT_CHECKPOINT_PATH));
        assert!(config.log_line_regex.is_none());
        assert_eq!(
            config.on_missing_watermark,
            MissingWatermarkStrategy::ResumeAfter
        );
        assert!(config.drain_on_startup);
        assert_eq!(config.influxdb.measurement, "gkle");
        assert_eq!(config.influxdb.timeout, Duration::from_secs(10));
        assert_eq!(config.influxdb.retention_policy, "");
        assert!(config.influxdb.hostname.is_some());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
gk_log_dir: /logs
checkpoint_path: /state/last
on_missing_watermark: halt
drain_on_startup: false
influxdb:
  url: https://influx:8086
  user: gk
  password: secret
  database: gatekeeper
  retention_policy: autogen
  hostname: edge-1
  measurement: gatekeeper
  timeout: 2s 500ms
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.checkpoint_path, PathBuf::from("/state/last"));
        assert_eq!(config.on_missing_watermark, MissingWatermarkStrategy::Halt);
        assert!(!config.drain_on_startup);
        assert_eq!(config.influxdb.hostname.as_deref(), Some("edge-1"));
        assert_eq!(config.influxdb.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
gk_log_dir: ""
log_line_regex: '^GK/(\d+)'
influxdb:
  url: localhost:8086
  user: ""
  password: secret
  database: gatekeeper
"#;
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("gk_log_dir")));
                assert!(errors.iter().any(|e| e.contains("log_line_regex")));
                assert!(errors.iter().any(|e| e.contains("http://")));
                assert!(errors.iter().any(|e| e.contains("user, password")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_log_dir_is_made_absolute() {
        let yaml = MINIMAL.replace("/var/log/gatekeeper", "logs/gatekeeper");
        let config = parse_config(&yaml).unwrap();
        assert!(config.gk_log_dir.is_absolute());
        assert_eq!(
            config.gk_log_dir,
            std::env::current_dir().unwrap().join("logs/gatekeeper")
        );
    }

    #[test]
    fn test_legacy_log_level_is_accepted() {
        let yaml = MINIMAL.to_string() + "  log_level: 2\n";
        let config = parse_config(&yaml).unwrap();
        assert_eq!(config.influxdb.log_level, Some(2));
        assert_eq!(config.influxdb.database, "gatekeeper");
    }

    #[test]
    fn test_missing_influx_section() {
        assert!(matches!(
            parse_config("gk_log_dir: /logs\n"),
            Err(ConfigError::YamlParse(_))
        ));
    }

    #[test]
    fn test_unknown_strategy() {
        let yaml = MINIMAL.to_string() + "on_missing_watermark: guess\n";
        assert!(matches!(parse_config(&yaml), Err(ConfigError::YamlParse(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("GKLE_TEST_INFLUX_PASSWORD", "from-env");
        let yaml = MINIMAL.replace("secret", "$env{GKLE_TEST_INFLUX_PASSWORD}");
        let config = parse_config(&yaml).unwrap();
        assert_eq!(config.influxdb.password, "from-env");
        std::env::remove_var("GKLE_TEST_INFLUX_PASSWORD");
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let yaml = MINIMAL.replace("secret", "$env{GKLE_TEST_DEFINITELY_UNSET}");
        match parse_config(&yaml) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("GKLE_TEST_DEFINITELY_UNSET"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
