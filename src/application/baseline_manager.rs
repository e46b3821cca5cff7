//! Historical Baseline Manager
//!
//! Maintains rolling per-key pressure history through the baseline store
//! and serves cached distribution snapshots. Store failures and thin
//! history degrade to a neutral context; they never abort analysis.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, NaiveDate};
use statrs::function::erf::erf_inv;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::params::BaselineSection;
use crate::domain::baseline::{BaselineContext, DailyAggregate, PercentileBands, PressureObservation};
use crate::domain::metrics::InstrumentKey;
use crate::ports::baseline_store::{BaselineStore, StoreError};

/// Cached baseline snapshot for one key. Invalidated by age or by write
/// count, whichever trips first.
#[derive(Debug, Clone)]
struct CacheEntry {
    context: BaselineContext,
    computed_at: Instant,
    writes_since: u32,
}

/// Rolling-history manager in front of a [`BaselineStore`].
///
/// Reads and writes are bounded by `store_timeout_ms`; a slow store is
/// treated the same as a failed one.
pub struct HistoricalBaselineManager {
    store: Arc<dyn BaselineStore>,
    config: BaselineSection,
    cache: HashMap<InstrumentKey, CacheEntry>,
}

impl HistoricalBaselineManager {
    pub fn new(store: Arc<dyn BaselineStore>, config: BaselineSection) -> Self {
        Self {
            store,
            config,
            cache: HashMap::new(),
        }
    }

    /// Append one observation to durable history. The cached snapshot for
    /// the key is retired once enough writes accumulate, so intraday
    /// activity is folded back into the baseline without a query per event.
    pub async fn update_history(
        &mut self,
        key: &InstrumentKey,
        observation: &PressureObservation,
    ) -> Result<(), StoreError> {
        let date = observation.timestamp.date_naive();
        let write = self.store.append_observation(key, date, observation);
        match timeout(self.store_deadline(), write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::WriteFailed(format!(
                    "append for {key} exceeded {}ms",
                    self.config.store_timeout_ms
                )));
            }
        }

        if let Some(entry) = self.cache.get_mut(key) {
            entry.writes_since += 1;
            if entry.writes_since >= self.config.refresh_write_count {
                self.cache.remove(key);
            }
        }
        Ok(())
    }

    /// Baseline distribution snapshot for a key as of a trade date.
    ///
    /// Served from cache while fresh; otherwise recomputed from the store
    /// over the lookback window. Thin history yields a neutral context
    /// (cached, so cold keys do not hammer the store); a store failure
    /// also yields a neutral context but is NOT cached, so the next event
    /// retries.
    pub async fn baseline_context(
        &mut self,
        key: &InstrumentKey,
        as_of: NaiveDate,
    ) -> BaselineContext {
        if let Some(entry) = self.cache.get(key) {
            let fresh = entry.computed_at.elapsed()
                < StdDuration::from_secs(self.config.cache_ttl_secs);
            if fresh && entry.writes_since < self.config.refresh_write_count {
                return entry.context.clone();
            }
        }

        let from = as_of - Duration::days(i64::from(self.config.lookback_days) - 1);
        let query = self.store.query_daily_aggregates(key, from, as_of);
        let aggregates = match timeout(self.store_deadline(), query).await {
            Ok(Ok(aggregates)) => aggregates,
            Ok(Err(err)) => {
                warn!(%key, error = %err, "Baseline query failed; degrading to neutral");
                return BaselineContext::neutral(key.clone(), self.config.lookback_days);
            }
            Err(_) => {
                warn!(
                    %key,
                    timeout_ms = self.config.store_timeout_ms,
                    "Baseline query timed out; degrading to neutral"
                );
                return BaselineContext::neutral(key.clone(), self.config.lookback_days);
            }
        };

        let context = self.summarize(key, &aggregates);
        self.cache.insert(
            key.clone(),
            CacheEntry {
                context: context.clone(),
                computed_at: Instant::now(),
                writes_since: 0,
            },
        );
        context
    }

    /// Evaluate one observed pressure ratio against a baseline snapshot.
    /// Pure: no store access, no cache mutation.
    pub fn compute_pressure_context(
        &self,
        observed_ratio: f64,
        base: &BaselineContext,
    ) -> BaselineContext {
        if !base.has_history() {
            return base.clone();
        }

        let percentile_rank = Self::percentile_rank(&base.percentiles, observed_ratio);
        let current_zscore = if base.pressure_std > 1e-9 {
            (observed_ratio - base.mean_pressure_ratio) / base.pressure_std
        } else {
            // Degenerate flat history: recover a z-score from the rank so
            // extreme observations still register as anomalous.
            let p = (percentile_rank / 100.0).clamp(0.001, 0.999);
            f64::sqrt(2.0) * erf_inv(2.0 * p - 1.0)
        };

        let anomaly_detected = current_zscore >= self.config.anomaly_zscore_threshold
            || percentile_rank >= self.config.anomaly_percentile_threshold;

        BaselineContext {
            current_zscore,
            percentile_rank,
            anomaly_detected,
            ..base.clone()
        }
    }

    /// Number of keys with a live cached snapshot
    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }

    fn store_deadline(&self) -> StdDuration {
        StdDuration::from_millis(self.config.store_timeout_ms)
    }

    /// Distribution statistics over daily average pressure ratios.
    fn summarize(&self, key: &InstrumentKey, aggregates: &[DailyAggregate]) -> BaselineContext {
        let sample_days = aggregates.len() as u32;
        if sample_days < self.config.min_sample_days {
            debug!(
                %key,
                sample_days,
                min_sample_days = self.config.min_sample_days,
                "Insufficient history for baseline"
            );
            return BaselineContext::neutral(key.clone(), self.config.lookback_days);
        }

        let mut values: Vec<f64> = aggregates.iter().map(|a| a.avg_pressure_ratio).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        let percentiles = PercentileBands {
            p50: Self::percentile_value(&values, 50.0),
            p75: Self::percentile_value(&values, 75.0),
            p90: Self::percentile_value(&values, 90.0),
            p95: Self::percentile_value(&values, 95.0),
            p99: Self::percentile_value(&values, 99.0),
        };

        let data_quality = (f64::from(sample_days) / f64::from(self.config.lookback_days)).min(1.0);
        let confidence = (f64::from(sample_days)
            / f64::from(self.config.confidence_saturation_days))
        .min(1.0);

        BaselineContext {
            key: key.clone(),
            lookback_days: self.config.lookback_days,
            mean_pressure_ratio: mean,
            pressure_std: std,
            percentiles,
            current_zscore: 0.0,
            percentile_rank: 0.0,
            anomaly_detected: false,
            data_quality,
            confidence,
        }
    }

    /// Linear-interpolated percentile of a sorted sample.
    fn percentile_value(sorted: &[f64], percentile: f64) -> f64 {
        debug_assert!(!sorted.is_empty());
        if sorted.len() == 1 {
            return sorted[0];
        }
        let position = percentile / 100.0 * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        if lower == upper {
            return sorted[lower];
        }
        let fraction = position - lower as f64;
        sorted[lower] + fraction * (sorted[upper] - sorted[lower])
    }

    /// Percentile rank of an observation against the stored bands.
    /// Below p50 scales linearly from 0; above p99 saturates at 99.
    fn percentile_rank(bands: &PercentileBands, observed: f64) -> f64 {
        let points = bands.points();
        let (_, p50_value) = points[0];
        if observed <= p50_value {
            if p50_value <= 0.0 {
                return 0.0;
            }
            return (observed / p50_value * 50.0).clamp(0.0, 50.0);
        }
        let (_, p99_value) = points[4];
        if observed >= p99_value {
            return 99.0;
        }
        for pair in points.windows(2) {
            let (lo_pct, lo_value) = pair[0];
            let (hi_pct, hi_value) = pair[1];
            if observed <= hi_value {
                if hi_value - lo_value <= f64::EPSILON {
                    return hi_pct;
                }
                let fraction = (observed - lo_value) / (hi_value - lo_value);
                return lo_pct + fraction * (hi_pct - lo_pct);
            }
        }
        99.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::InMemoryBaselineStore;
    use crate::domain::metrics::OptionType;
    use crate::ports::baseline_store::MockBaselineStore;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn key() -> InstrumentKey {
        InstrumentKey::new(dec!(21900.0), OptionType::Call)
    }

    fn observation(day: u32, ratio: f64) -> PressureObservation {
        PressureObservation {
            timestamp: Utc.with_ymd_and_hms(2026, 6, day, 10, 0, 0).unwrap(),
            pressure_ratio: ratio,
            bid_volume: 100,
            ask_volume: (100.0 * ratio) as u64,
            total_trades: 10,
        }
    }

    async fn seeded_manager(ratios: &[f64]) -> HistoricalBaselineManager {
        let store = Arc::new(InMemoryBaselineStore::new());
        let mut manager = HistoricalBaselineManager::new(store, BaselineSection::default());
        for (i, ratio) in ratios.iter().enumerate() {
            manager
                .update_history(&key(), &observation(10 + i as u32, *ratio))
                .await
                .unwrap();
        }
        manager
    }

    #[tokio::test]
    async fn test_baseline_statistics_over_seeded_history() {
        let mut manager = seeded_manager(&[1.5, 2.0, 2.5, 3.0, 4.0]).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let base = manager.baseline_context(&key(), as_of).await;

        assert!(base.has_history());
        assert_relative_eq!(base.mean_pressure_ratio, 2.6, epsilon = 1e-9);
        assert_relative_eq!(base.pressure_std, 0.860_232, epsilon = 1e-4);
        assert_relative_eq!(base.confidence, 0.5, epsilon = 1e-9);
        assert_relative_eq!(base.data_quality, 0.25, epsilon = 1e-9);
        assert_relative_eq!(base.percentiles.p50, 2.5, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_extreme_observation_flags_anomaly() {
        let mut manager = seeded_manager(&[1.5, 2.0, 2.5, 3.0, 4.0]).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let base = manager.baseline_context(&key(), as_of).await;

        let context = manager.compute_pressure_context(6.0, &base);
        assert!(context.current_zscore > 3.9);
        assert_relative_eq!(context.percentile_rank, 99.0, epsilon = 1e-9);
        assert!(context.anomaly_detected);
    }

    #[tokio::test]
    async fn test_typical_observation_is_not_anomalous() {
        let mut manager = seeded_manager(&[1.5, 2.0, 2.5, 3.0, 4.0]).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let base = manager.baseline_context(&key(), as_of).await;

        let context = manager.compute_pressure_context(2.6, &base);
        assert!(context.current_zscore.abs() < 0.1);
        assert!(!context.anomaly_detected);
    }

    #[tokio::test]
    async fn test_thin_history_degrades_to_neutral() {
        let mut manager = seeded_manager(&[2.0, 2.5]).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let base = manager.baseline_context(&key(), as_of).await;

        assert!(!base.has_history());
        let context = manager.compute_pressure_context(10.0, &base);
        assert!(!context.anomaly_detected);
        assert_eq!(context.current_zscore, 0.0);
    }

    #[tokio::test]
    async fn test_flat_history_uses_rank_derived_zscore() {
        let mut manager = seeded_manager(&[2.0, 2.0, 2.0, 2.0, 2.0]).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let base = manager.baseline_context(&key(), as_of).await;
        assert!(base.pressure_std < 1e-9);

        let typical = manager.compute_pressure_context(2.0, &base);
        assert!(!typical.anomaly_detected);

        let extreme = manager.compute_pressure_context(3.0, &base);
        assert_relative_eq!(extreme.percentile_rank, 99.0, epsilon = 1e-9);
        assert!(extreme.current_zscore > 2.0);
        assert!(extreme.anomaly_detected);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_and_is_not_cached() {
        let mut mock = MockBaselineStore::new();
        mock.expect_query_daily_aggregates()
            .times(2)
            .returning(|_, _, _| Err(StoreError::ReadFailed("disk gone".to_string())));

        let mut manager =
            HistoricalBaselineManager::new(Arc::new(mock), BaselineSection::default());
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

        let first = manager.baseline_context(&key(), as_of).await;
        assert!(!first.has_history());
        assert_eq!(manager.cached_keys(), 0);

        // Second call must hit the store again rather than serve a
        // poisoned cache entry.
        let second = manager.baseline_context(&key(), as_of).await;
        assert!(!second.has_history());
    }

    #[tokio::test]
    async fn test_snapshot_served_from_cache() {
        let mut mock = MockBaselineStore::new();
        mock.expect_query_daily_aggregates().times(1).returning(|_, _, _| {
            Ok((0..5)
                .map(|i| DailyAggregate {
                    date: NaiveDate::from_ymd_opt(2026, 6, 10 + i).unwrap(),
                    avg_pressure_ratio: 2.0 + f64::from(i) * 0.1,
                    max_pressure_ratio: 3.0,
                    total_volume: 1_000,
                    observation_count: 5,
                })
                .collect())
        });

        let mut manager =
            HistoricalBaselineManager::new(Arc::new(mock), BaselineSection::default());
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

        let first = manager.baseline_context(&key(), as_of).await;
        let second = manager.baseline_context(&key(), as_of).await;
        assert_relative_eq!(
            first.mean_pressure_ratio,
            second.mean_pressure_ratio,
            epsilon = 1e-12
        );
        assert_eq!(manager.cached_keys(), 1);
    }

    #[tokio::test]
    async fn test_write_count_retires_cached_snapshot() {
        let store = Arc::new(InMemoryBaselineStore::new());
        let config = BaselineSection {
            refresh_write_count: 2,
            ..Default::default()
        };
        let mut manager = HistoricalBaselineManager::new(store, config);
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

        for (i, ratio) in [2.0, 2.0, 2.0, 2.0, 2.0].iter().enumerate() {
            manager
                .update_history(&key(), &observation(10 + i as u32, *ratio))
                .await
                .unwrap();
        }
        let before = manager.baseline_context(&key(), as_of).await;
        assert_relative_eq!(before.mean_pressure_ratio, 2.0, epsilon = 1e-9);

        // Two writes trip the refresh threshold and retire the snapshot.
        manager
            .update_history(&key(), &observation(15, 8.0))
            .await
            .unwrap();
        manager
            .update_history(&key(), &observation(15, 8.0))
            .await
            .unwrap();
        assert_eq!(manager.cached_keys(), 0);

        let after = manager.baseline_context(&key(), as_of).await;
        assert!(after.mean_pressure_ratio > before.mean_pressure_ratio);
    }

    #[test]
    fn test_percentile_rank_interpolation() {
        let bands = PercentileBands {
            p50: 2.0,
            p75: 2.5,
            p90: 3.0,
            p95: 3.5,
            p99: 4.0,
        };
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_rank(&bands, 1.0),
            25.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_rank(&bands, 2.25),
            62.5,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_rank(&bands, 3.75),
            97.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_rank(&bands, 9.0),
            99.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_percentile_value_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_value(&sorted, 50.0),
            3.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_value(&sorted, 75.0),
            4.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            HistoricalBaselineManager::percentile_value(&sorted, 99.0),
            4.96,
            epsilon = 1e-9
        );
    }
}
