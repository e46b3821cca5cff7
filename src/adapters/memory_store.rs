//! In-Memory Baseline Store
//!
//! Concurrency-safe store keeping daily buckets per instrument key behind a
//! `tokio::sync::RwLock`. Observations fold into their day's bucket on
//! write, so lookback queries stay O(lookback_days).

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::domain::baseline::{DailyAggregate, PressureObservation};
use crate::domain::metrics::InstrumentKey;
use crate::ports::baseline_store::{BaselineStore, StoreError};

/// Running aggregate of one key's observations for one trade date.
#[derive(Debug, Clone, Default)]
pub(crate) struct DayBucket {
    ratio_sum: f64,
    max_ratio: f64,
    total_volume: u64,
    count: u32,
}

impl DayBucket {
    pub(crate) fn add(&mut self, observation: &PressureObservation) {
        self.ratio_sum += observation.pressure_ratio;
        self.max_ratio = self.max_ratio.max(observation.pressure_ratio);
        self.total_volume += observation.bid_volume + observation.ask_volume;
        self.count += 1;
    }

    pub(crate) fn to_aggregate(&self, date: NaiveDate) -> DailyAggregate {
        DailyAggregate {
            date,
            avg_pressure_ratio: if self.count > 0 {
                self.ratio_sum / self.count as f64
            } else {
                0.0
            },
            max_pressure_ratio: self.max_ratio,
            total_volume: self.total_volume,
            observation_count: self.count,
        }
    }
}

pub(crate) type DayIndex = HashMap<InstrumentKey, BTreeMap<NaiveDate, DayBucket>>;

/// Query daily aggregates from a bucket index, ascending by date.
pub(crate) fn aggregates_from_index(
    index: &DayIndex,
    key: &InstrumentKey,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DailyAggregate> {
    index
        .get(key)
        .map(|days| {
            days.range(from..=to)
                .map(|(date, bucket)| bucket.to_aggregate(*date))
                .collect()
        })
        .unwrap_or_default()
}

/// In-memory baseline store. Safe to share across concurrent engine
/// instances; all history is lost on process exit.
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    inner: RwLock<DayIndex>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instrument keys with any history
    pub async fn key_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl BaselineStore for InMemoryBaselineStore {
    async fn append_observation(
        &self,
        key: &InstrumentKey,
        date: NaiveDate,
        observation: &PressureObservation,
    ) -> Result<(), StoreError> {
        let mut index = self.inner.write().await;
        index
            .entry(key.clone())
            .or_default()
            .entry(date)
            .or_default()
            .add(observation);
        Ok(())
    }

    async fn query_daily_aggregates(
        &self,
        key: &InstrumentKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAggregate>, StoreError> {
        let index = self.inner.read().await;
        Ok(aggregates_from_index(&index, key, from, to))
    }
}
