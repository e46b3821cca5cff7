//! Configuration Loader
//!
//! Loads `IfdConfig` from a TOML file and validates it. Every section is
//! optional in the file; absent sections take their defaults.

use std::path::Path;
use thiserror::Error;

use crate::config::params::{ConfigError, IfdConfig};

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(#[from] ConfigError),
}

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IfdConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path)?;
    let config: IfdConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[baseline]
lookback_days = 20
min_sample_days = 3
anomaly_zscore_threshold = 2.0
anomaly_percentile_threshold = 95.0

[pressure]
min_pressure_ratio = 1.5
min_total_volume = 100
min_confidence = 0.5

[market_making]
straddle_time_window_secs = 300
volatility_crush_threshold = 0.15
reject_threshold = 0.7
monitor_threshold = 0.4

[scoring]
significance_weight = 0.35
trend_weight = 0.20
concentration_weight = 0.25
persistence_weight = 0.20

[engine]
min_final_confidence = 0.55
recent_signal_capacity = 100
"#
        .to_string()
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(create_valid_config().as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.baseline.lookback_days, 20);
        assert_eq!(config.pressure.min_total_volume, 100);
        assert_eq!(config.engine.recent_signal_capacity, 100);
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[baseline]\nlookback_days = 30\n").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.baseline.lookback_days, 30);
        // Untouched sections fall back to defaults
        assert_eq!(config.engine.min_final_confidence, 0.55);
        assert_eq!(config.market_making.straddle_time_window_secs, 300);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/ifd.toml");
        assert!(matches!(result, Err(ConfigFileError::IoError(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[baseline\nlookback_days = ").unwrap();

        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigFileError::ParseError(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[baseline]\nlookback_days = 0\n").unwrap();

        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigFileError::ValidationError(_))));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[scoring]\nsignificance_weight = 0.9\n")
            .unwrap();

        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigFileError::ValidationError(_))));
    }
}
