//! Baseline Types
//!
//! Historical pressure distribution types: per-day aggregates read from the
//! baseline store and the derived `BaselineContext` used to judge whether a
//! new observation is anomalous.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::metrics::InstrumentKey;

/// One raw pressure observation as persisted by the baseline store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureObservation {
    /// Event timestamp (window end of the source metrics)
    pub timestamp: DateTime<Utc>,
    /// Derived pressure ratio at observation time
    pub pressure_ratio: f64,
    /// Bid-side volume
    pub bid_volume: u64,
    /// Ask-side volume
    pub ask_volume: u64,
    /// Trade count in the window
    pub total_trades: u32,
}

/// Daily aggregate of pressure observations for one instrument key.
/// Daily granularity keeps lookback queries O(lookback_days) regardless of
/// intraday observation rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// Trade date
    pub date: NaiveDate,
    /// Mean pressure ratio across the day's observations
    pub avg_pressure_ratio: f64,
    /// Highest pressure ratio seen during the day
    pub max_pressure_ratio: f64,
    /// Total traded volume for the day
    pub total_volume: u64,
    /// Number of observations aggregated
    pub observation_count: u32,
}

/// Percentile bands of the historical daily pressure-ratio distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl PercentileBands {
    /// All-zero bands for the no-history degrade path
    pub fn zero() -> Self {
        Self {
            p50: 0.0,
            p75: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }

    /// Band points as (percentile, value) pairs, ascending
    pub fn points(&self) -> [(f64, f64); 5] {
        [
            (50.0, self.p50),
            (75.0, self.p75),
            (90.0, self.p90),
            (95.0, self.p95),
            (99.0, self.p99),
        ]
    }
}

/// Historical baseline context for one instrument key, recomputed per
/// request against the cached snapshot. "Not enough history" is expressed
/// as a neutral context, never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineContext {
    pub key: InstrumentKey,
    /// Lookback horizon the baseline was computed over
    pub lookback_days: u32,
    /// Mean of the daily average pressure ratios
    pub mean_pressure_ratio: f64,
    /// Standard deviation of the daily average pressure ratios
    pub pressure_std: f64,
    /// Percentile bands of the daily distribution
    pub percentiles: PercentileBands,
    /// Z-score of the current observation vs the baseline
    pub current_zscore: f64,
    /// Percentile rank of the current observation (0-100)
    pub percentile_rank: f64,
    /// Whether the current observation breaches the anomaly thresholds
    pub anomaly_detected: bool,
    /// Fraction of lookback days that had at least one observation (0-1)
    pub data_quality: f64,
    /// Baseline confidence, monotone and saturating in sample count (0-1)
    pub confidence: f64,
}

impl BaselineContext {
    /// Neutral context for keys with insufficient history: zero statistics,
    /// no anomaly, zero confidence. The degrade-don't-fail path.
    pub fn neutral(key: InstrumentKey, lookback_days: u32) -> Self {
        Self {
            key,
            lookback_days,
            mean_pressure_ratio: 0.0,
            pressure_std: 0.0,
            percentiles: PercentileBands::zero(),
            current_zscore: 0.0,
            percentile_rank: 0.0,
            anomaly_detected: false,
            data_quality: 0.0,
            confidence: 0.0,
        }
    }

    /// True when this context carries real historical statistics
    pub fn has_history(&self) -> bool {
        self.confidence > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::OptionType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_neutral_context() {
        let key = InstrumentKey::new(dec!(21900.0), OptionType::Call);
        let ctx = BaselineContext::neutral(key, 20);
        assert_eq!(ctx.mean_pressure_ratio, 0.0);
        assert_eq!(ctx.pressure_std, 0.0);
        assert_eq!(ctx.data_quality, 0.0);
        assert_eq!(ctx.confidence, 0.0);
        assert!(!ctx.anomaly_detected);
        assert!(!ctx.has_history());
    }

    #[test]
    fn test_percentile_points_ascending() {
        let bands = PercentileBands {
            p50: 1.0,
            p75: 1.5,
            p90: 2.0,
            p95: 2.5,
            p99: 3.5,
        };
        let points = bands.points();
        assert_eq!(points[0], (50.0, 1.0));
        assert_eq!(points[4], (99.0, 3.5));
        for pair in points.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_daily_aggregate_roundtrip() {
        let agg = DailyAggregate {
            date: NaiveDate::from_ymd_opt(2026, 6, 15).unwrap(),
            avg_pressure_ratio: 2.4,
            max_pressure_ratio: 3.1,
            total_volume: 12_000,
            observation_count: 42,
        };
        let json = serde_json::to_string(&agg).unwrap();
        let back: DailyAggregate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.date, agg.date);
        assert_eq!(back.observation_count, 42);
    }
}
