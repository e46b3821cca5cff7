//! Domain Module
//!
//! Pure business types of the detection pipeline: input pressure metrics,
//! historical baseline contexts, and emitted institutional signals.

pub mod baseline;
pub mod metrics;
pub mod signal;

pub use baseline::{BaselineContext, DailyAggregate, PercentileBands, PressureObservation};
pub use metrics::{DominantSide, InstrumentKey, MetricsError, OptionType, PressureMetrics};
pub use signal::{ExpectedDirection, InstitutionalSignal, RecommendedAction, SignalStrength};
