//! Detection Parameters
//!
//! Configuration sections for the detection pipeline. All thresholds and
//! weights are externally supplied; malformed values fail fast at engine
//! construction, never per-event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors (fatal at construction)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("lookback_days must be >= 1, got {0}")]
    InvalidLookback(u32),

    #[error("min_sample_days {0} must be >= 1 and <= lookback_days {1}")]
    InvalidMinSampleDays(u32, u32),

    #[error("{name} must be {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        range: &'static str,
    },

    #[error("{name} must be > 0")]
    ZeroParameter { name: &'static str },

    #[error("{name} weights must sum to 1.0, got {sum:.6}")]
    WeightsNotNormalized { name: &'static str, sum: f64 },

    #[error("monitor_threshold {0} must be below reject_threshold {1}")]
    InvertedFilterBand(f64, f64),
}

/// Top-level configuration for the detection engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IfdConfig {
    #[serde(default)]
    pub baseline: BaselineSection,
    #[serde(default)]
    pub pressure: PressureSection,
    #[serde(default)]
    pub market_making: MarketMakingSection,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub engine: EngineSection,
}

impl IfdConfig {
    /// Validate every section. Called by the engine constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.baseline.validate()?;
        self.pressure.validate()?;
        self.market_making.validate()?;
        self.scoring.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Historical baseline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSection {
    /// Days of daily aggregates the baseline is computed over
    pub lookback_days: u32,
    /// Minimum distinct days of history before the baseline is trusted;
    /// below this the context degrades to neutral
    pub min_sample_days: u32,
    /// Z-score at or above which an observation is anomalous
    pub anomaly_zscore_threshold: f64,
    /// Percentile rank at or above which an observation is anomalous
    pub anomaly_percentile_threshold: f64,
    /// Cache entry lifetime (session-rollover proxy)
    pub cache_ttl_secs: u64,
    /// Writes to a key before its cached snapshot is recomputed
    pub refresh_write_count: u32,
    /// Upper bound on a single store read/write
    pub store_timeout_ms: u64,
    /// Sample days at which baseline confidence saturates at 1.0
    pub confidence_saturation_days: u32,
}

impl Default for BaselineSection {
    fn default() -> Self {
        Self {
            lookback_days: 20,
            min_sample_days: 3,
            anomaly_zscore_threshold: 2.0,
            anomaly_percentile_threshold: 95.0,
            cache_ttl_secs: 900,
            refresh_write_count: 25,
            store_timeout_ms: 20,
            confidence_saturation_days: 10,
        }
    }
}

impl BaselineSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback_days == 0 {
            return Err(ConfigError::InvalidLookback(self.lookback_days));
        }
        if self.min_sample_days == 0 || self.min_sample_days > self.lookback_days {
            return Err(ConfigError::InvalidMinSampleDays(
                self.min_sample_days,
                self.lookback_days,
            ));
        }
        if self.anomaly_zscore_threshold <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "anomaly_zscore_threshold",
                value: self.anomaly_zscore_threshold,
                range: "> 0",
            });
        }
        if !(0.0..=100.0).contains(&self.anomaly_percentile_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "anomaly_percentile_threshold",
                value: self.anomaly_percentile_threshold,
                range: "within 0-100",
            });
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "cache_ttl_secs",
            });
        }
        if self.refresh_write_count == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "refresh_write_count",
            });
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "store_timeout_ms",
            });
        }
        if self.confidence_saturation_days == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "confidence_saturation_days",
            });
        }
        Ok(())
    }
}

/// Real-time pressure analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSection {
    /// Minimum pressure ratio for an observation to count toward
    /// persistence (and to pass the engine's pre-gate)
    pub min_pressure_ratio: f64,
    /// Minimum total volume for an observation to be scored
    pub min_total_volume: u64,
    /// Minimum upstream confidence for an observation to be scored
    pub min_confidence: f64,
    /// Maximum observations retained per instrument window
    pub window_max_observations: usize,
    /// Maximum age of a window entry before eviction
    pub window_max_age_secs: u64,
    /// Interval within which observations count as clustered
    pub cluster_interval_secs: u64,
    /// Scale dividing (ratio - 1) * ln(1 + volume) before clipping to [0, 1]
    pub significance_scale: f64,
}

impl Default for PressureSection {
    fn default() -> Self {
        Self {
            min_pressure_ratio: 1.5,
            min_total_volume: 100,
            min_confidence: 0.5,
            window_max_observations: 20,
            window_max_age_secs: 600,
            cluster_interval_secs: 60,
            significance_scale: 10.0,
        }
    }
}

impl PressureSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pressure_ratio <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "min_pressure_ratio",
                value: self.min_pressure_ratio,
                range: "> 0",
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::OutOfRange {
                name: "min_confidence",
                value: self.min_confidence,
                range: "within 0-1",
            });
        }
        if self.window_max_observations == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "window_max_observations",
            });
        }
        if self.window_max_age_secs == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "window_max_age_secs",
            });
        }
        if self.cluster_interval_secs == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "cluster_interval_secs",
            });
        }
        if self.significance_scale <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "significance_scale",
                value: self.significance_scale,
                range: "> 0",
            });
        }
        Ok(())
    }
}

/// Market-making detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketMakingSection {
    /// Window for matching an opposite-side print at the same strike
    pub straddle_time_window_secs: u64,
    /// Relative pressure decline that counts as one side "crushing"
    pub volatility_crush_threshold: f64,
    /// Weight of straddle probability in the combined score
    pub straddle_weight: f64,
    /// Weight of volatility-crush probability in the combined score
    pub crush_weight: f64,
    /// Market-making score at or above which a signal is rejected
    pub reject_threshold: f64,
    /// Market-making score at or above which a signal is only monitored
    pub monitor_threshold: f64,
    /// Lifetime of per-strike cross-side state
    pub index_ttl_secs: u64,
}

impl Default for MarketMakingSection {
    fn default() -> Self {
        Self {
            straddle_time_window_secs: 300,
            volatility_crush_threshold: 0.15,
            straddle_weight: 0.6,
            crush_weight: 0.4,
            reject_threshold: 0.7,
            monitor_threshold: 0.4,
            index_ttl_secs: 900,
        }
    }
}

impl MarketMakingSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.straddle_time_window_secs == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "straddle_time_window_secs",
            });
        }
        if !(0.0..1.0).contains(&self.volatility_crush_threshold)
            || self.volatility_crush_threshold == 0.0
        {
            return Err(ConfigError::OutOfRange {
                name: "volatility_crush_threshold",
                value: self.volatility_crush_threshold,
                range: "within (0, 1)",
            });
        }
        let sum = self.straddle_weight + self.crush_weight;
        if self.straddle_weight < 0.0 || self.crush_weight < 0.0 || (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsNotNormalized {
                name: "market_making",
                sum,
            });
        }
        if !(0.0..=1.0).contains(&self.reject_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "reject_threshold",
                value: self.reject_threshold,
                range: "within 0-1",
            });
        }
        if !(0.0..=1.0).contains(&self.monitor_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "monitor_threshold",
                value: self.monitor_threshold,
                range: "within 0-1",
            });
        }
        if self.monitor_threshold >= self.reject_threshold {
            return Err(ConfigError::InvertedFilterBand(
                self.monitor_threshold,
                self.reject_threshold,
            ));
        }
        if self.index_ttl_secs < self.straddle_time_window_secs {
            return Err(ConfigError::ZeroParameter {
                name: "index_ttl_secs (must cover straddle_time_window_secs)",
            });
        }
        Ok(())
    }
}

/// Confidence blend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    /// Weight of pressure_significance in the raw score
    pub significance_weight: f64,
    /// Weight of trend_strength in the raw score
    pub trend_weight: f64,
    /// Weight of volume_concentration in the raw score
    pub concentration_weight: f64,
    /// Weight of time_persistence in the raw score
    pub persistence_weight: f64,
    /// Weight of the raw pressure score in the blend
    pub pressure_blend_weight: f64,
    /// Weight of the baseline confidence in the blend
    pub baseline_blend_weight: f64,
    /// Bonus added per corroborating nearby strike
    pub coordination_bonus_per_strike: f64,
    /// Upper bound on the total coordination bonus
    pub max_coordination_bonus: f64,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            significance_weight: 0.35,
            trend_weight: 0.20,
            concentration_weight: 0.25,
            persistence_weight: 0.20,
            pressure_blend_weight: 0.6,
            baseline_blend_weight: 0.4,
            coordination_bonus_per_strike: 0.03,
            max_coordination_bonus: 0.10,
        }
    }
}

impl ScoringSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let raw_weights = [
            self.significance_weight,
            self.trend_weight,
            self.concentration_weight,
            self.persistence_weight,
        ];
        let raw_sum: f64 = raw_weights.iter().sum();
        if raw_weights.iter().any(|w| *w < 0.0) || (raw_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsNotNormalized {
                name: "pressure",
                sum: raw_sum,
            });
        }

        let blend_sum = self.pressure_blend_weight + self.baseline_blend_weight;
        if self.pressure_blend_weight < 0.0
            || self.baseline_blend_weight < 0.0
            || (blend_sum - 1.0).abs() > 1e-6
        {
            return Err(ConfigError::WeightsNotNormalized {
                name: "blend",
                sum: blend_sum,
            });
        }

        if !(0.0..=0.25).contains(&self.max_coordination_bonus) {
            return Err(ConfigError::OutOfRange {
                name: "max_coordination_bonus",
                value: self.max_coordination_bonus,
                range: "within 0-0.25",
            });
        }
        if self.coordination_bonus_per_strike < 0.0
            || self.coordination_bonus_per_strike > self.max_coordination_bonus
        {
            return Err(ConfigError::OutOfRange {
                name: "coordination_bonus_per_strike",
                value: self.coordination_bonus_per_strike,
                range: "within 0-max_coordination_bonus",
            });
        }
        Ok(())
    }
}

/// Engine orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Minimum final confidence for a signal to be emitted
    pub min_final_confidence: f64,
    /// Capacity of the recent-signal ring buffer
    pub recent_signal_capacity: usize,
    /// Window for cross-strike directional corroboration
    pub coordination_window_secs: u64,
    /// Strikes within this percentage distance count as "nearby"
    pub coordination_strike_band_pct: f64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            min_final_confidence: 0.55,
            recent_signal_capacity: 100,
            coordination_window_secs: 300,
            coordination_strike_band_pct: 2.0,
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_final_confidence) || self.min_final_confidence == 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "min_final_confidence",
                value: self.min_final_confidence,
                range: "within (0, 1]",
            });
        }
        if self.recent_signal_capacity == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "recent_signal_capacity",
            });
        }
        if self.coordination_window_secs == 0 {
            return Err(ConfigError::ZeroParameter {
                name: "coordination_window_secs",
            });
        }
        if self.coordination_strike_band_pct <= 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "coordination_strike_band_pct",
                value: self.coordination_strike_band_pct,
                range: "> 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(IfdConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let mut config = IfdConfig::default();
        config.baseline.lookback_days = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLookback(0))
        ));
    }

    #[test]
    fn test_min_sample_days_exceeding_lookback_rejected() {
        let mut config = IfdConfig::default();
        config.baseline.min_sample_days = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinSampleDays(30, 20))
        ));
    }

    #[test]
    fn test_pressure_weights_must_sum_to_one() {
        let mut config = IfdConfig::default();
        config.scoring.significance_weight = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightsNotNormalized { name: "pressure", .. })
        ));
    }

    #[test]
    fn test_blend_weights_must_sum_to_one() {
        let mut config = IfdConfig::default();
        config.scoring.pressure_blend_weight = 0.7;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightsNotNormalized { name: "blend", .. })
        ));
    }

    #[test]
    fn test_mm_weights_must_sum_to_one() {
        let mut config = IfdConfig::default();
        config.market_making.straddle_weight = 0.9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightsNotNormalized {
                name: "market_making",
                ..
            })
        ));
    }

    #[test]
    fn test_inverted_filter_band_rejected() {
        let mut config = IfdConfig::default();
        config.market_making.monitor_threshold = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedFilterBand(_, _))
        ));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = IfdConfig::default();
        config.baseline.anomaly_zscore_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_final_confidence_range() {
        let mut config = IfdConfig::default();
        config.engine.min_final_confidence = 1.5;
        assert!(config.validate().is_err());

        config.engine.min_final_confidence = 0.0;
        assert!(config.validate().is_err());
    }
}
