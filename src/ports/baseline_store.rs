//! Baseline Store Port
//!
//! Persistence contract for rolling pressure history. Implementations own
//! durability; the engine only appends observations and reads daily
//! aggregates over a bounded lookback window. Any store satisfying this
//! contract is acceptable - schema and location are deployment details.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::domain::baseline::{DailyAggregate, PressureObservation};
use crate::domain::metrics::InstrumentKey;

/// Store failure taxonomy. All variants are recoverable from the engine's
/// perspective: analysis continues in a degraded no-durable-history mode.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Failed to write observation: {0}")]
    WriteFailed(String),

    #[error("Failed to read aggregates: {0}")]
    ReadFailed(String),

    #[error("Store data is corrupted: {0}")]
    Corrupted(String),
}

/// Durable append-only log of pressure observations per instrument key,
/// queryable by lookback window at daily granularity.
///
/// Implementations must support safe concurrent read-modify-writes: the
/// store may be shared by multiple engine instances.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Append one observation keyed by (instrument key, trade date).
    /// Duplicates are not deduplicated; they simply widen the sample.
    async fn append_observation(
        &self,
        key: &InstrumentKey,
        date: NaiveDate,
        observation: &PressureObservation,
    ) -> Result<(), StoreError>;

    /// Read daily aggregates for a key over [from, to], ascending by date.
    /// Days with no observations are absent from the result.
    async fn query_daily_aggregates(
        &self,
        key: &InstrumentKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAggregate>, StoreError>;
}
