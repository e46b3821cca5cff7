//! Pressure Metrics
//!
//! Input types for the detection pipeline: one `PressureMetrics` per
//! (instrument, time window), pre-aggregated by an upstream producer from
//! raw order-book and trade events. The engine never parses raw feeds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors for malformed input observations. These are invariant violations
/// at the call boundary; the engine rejects rather than fabricating data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Observation has zero total volume for {0}")]
    ZeroVolume(InstrumentKey),

    #[error("Upstream confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("Average trade size {0} is negative or non-finite")]
    InvalidTradeSize(f64),

    #[error("Provider pressure ratio {0} must be finite and > 0")]
    InvalidProviderRatio(f64),

    #[error("Window end {end} precedes window start {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Option contract type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// The opposite side of the same strike (CALL <-> PUT)
    pub fn opposite(&self) -> Self {
        match self {
            OptionType::Call => OptionType::Put,
            OptionType::Put => OptionType::Call,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

/// Which side dominated the flow within the observation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DominantSide {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for DominantSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DominantSide::Buy => write!(f, "BUY"),
            DominantSide::Sell => write!(f, "SELL"),
            DominantSide::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Instrument key: one strike of one option type, scoped implicitly to a
/// single underlying/session. `Decimal` strikes give exact hashing, no
/// float-equality surprises in map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub strike: Decimal,
    pub option_type: OptionType,
}

impl InstrumentKey {
    pub fn new(strike: Decimal, option_type: OptionType) -> Self {
        Self {
            strike,
            option_type,
        }
    }

    /// Key for the opposite option type at the same strike
    pub fn opposite(&self) -> Self {
        Self {
            strike: self.strike,
            option_type: self.option_type.opposite(),
        }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.strike, self.option_type)
    }
}

/// One per-strike order-flow pressure observation, immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureMetrics {
    /// Instrument this observation belongs to
    pub key: InstrumentKey,
    /// Start of the aggregation window
    pub window_start: DateTime<Utc>,
    /// End of the aggregation window
    pub window_end: DateTime<Utc>,
    /// Volume traded at the bid during the window
    pub bid_volume: u64,
    /// Volume traded at the ask during the window
    pub ask_volume: u64,
    /// Provider-supplied pressure ratio. Advisory only: the engine always
    /// derives its own ratio from bid/ask volumes.
    #[serde(default)]
    pub provider_pressure_ratio: Option<f64>,
    /// Number of trades in the window
    pub total_trades: u32,
    /// Average trade size in contracts
    pub avg_trade_size: f64,
    /// Side that dominated the window's flow
    pub dominant_side: DominantSide,
    /// Upstream aggregator confidence in this observation (0-1)
    pub confidence: f64,
}

impl PressureMetrics {
    /// Total traded volume in the window
    pub fn total_volume(&self) -> u64 {
        self.bid_volume + self.ask_volume
    }

    /// Pressure ratio derived from volumes: ask / max(bid, 1).
    /// A ratio > 1 indicates buy-side pressure (flow hitting the ask).
    pub fn pressure_ratio(&self) -> f64 {
        self.ask_volume as f64 / self.bid_volume.max(1) as f64
    }

    /// How lopsided the flow is within this single observation (0.5-1.0)
    pub fn volume_concentration(&self) -> f64 {
        let total = self.total_volume();
        if total == 0 {
            return 0.0;
        }
        self.bid_volume.max(self.ask_volume) as f64 / total as f64
    }

    /// Validate input invariants. Zero-volume observations should have been
    /// dropped at the producer boundary; reaching here is a caller bug.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.total_volume() == 0 {
            return Err(MetricsError::ZeroVolume(self.key.clone()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(MetricsError::InvalidConfidence(self.confidence));
        }
        if !self.avg_trade_size.is_finite() || self.avg_trade_size < 0.0 {
            return Err(MetricsError::InvalidTradeSize(self.avg_trade_size));
        }
        if let Some(ratio) = self.provider_pressure_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(MetricsError::InvalidProviderRatio(ratio));
            }
        }
        if self.window_end < self.window_start {
            return Err(MetricsError::InvalidWindow {
                start: self.window_start,
                end: self.window_end,
            });
        }
        Ok(())
    }
}
