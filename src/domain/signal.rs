//! Institutional Signal
//!
//! Output types of the detection pipeline. A signal is created only by the
//! engine once thresholds are met and is never mutated afterwards. All
//! confidence components are carried alongside the final score so
//! downstream consumers can audit the decomposition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::metrics::{DominantSide, InstrumentKey};

/// Discrete signal strength bucket derived from final confidence.
/// Thresholds are fixed: the bucketing exists for downstream prioritization
/// and must stay stable across deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl SignalStrength {
    /// Monotonic bucketing of final confidence
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            SignalStrength::Extreme
        } else if confidence >= 0.8 {
            SignalStrength::VeryHigh
        } else if confidence >= 0.7 {
            SignalStrength::High
        } else {
            SignalStrength::Moderate
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStrength::Moderate => write!(f, "MODERATE"),
            SignalStrength::High => write!(f, "HIGH"),
            SignalStrength::VeryHigh => write!(f, "VERY_HIGH"),
            SignalStrength::Extreme => write!(f, "EXTREME"),
        }
    }
}

/// Direction the institutional flow is expected to push the underlying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectedDirection {
    Long,
    Short,
}

impl ExpectedDirection {
    /// Derive direction from the dominant side, falling back to the
    /// pressure sign when the window was neutral. Ratio > 1 means flow
    /// hitting the ask, i.e. buy-side pressure.
    pub fn from_flow(dominant_side: DominantSide, pressure_ratio: f64) -> Self {
        match dominant_side {
            DominantSide::Buy => ExpectedDirection::Long,
            DominantSide::Sell => ExpectedDirection::Short,
            DominantSide::Neutral => {
                if pressure_ratio >= 1.0 {
                    ExpectedDirection::Long
                } else {
                    ExpectedDirection::Short
                }
            }
        }
    }
}

impl fmt::Display for ExpectedDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedDirection::Long => write!(f, "LONG"),
            ExpectedDirection::Short => write!(f, "SHORT"),
        }
    }
}

/// Action recommended to downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Ignore,
    Monitor,
    Buy,
    StrongBuy,
}

impl RecommendedAction {
    /// Direction x strength lookup. The engine is long-biased: short-side
    /// signals are surfaced for monitoring, not acted on directly.
    pub fn from_direction_and_strength(
        direction: ExpectedDirection,
        strength: SignalStrength,
    ) -> Self {
        match (direction, strength) {
            (ExpectedDirection::Long, SignalStrength::Extreme)
            | (ExpectedDirection::Long, SignalStrength::VeryHigh) => RecommendedAction::StrongBuy,
            (ExpectedDirection::Long, SignalStrength::High) => RecommendedAction::Buy,
            (ExpectedDirection::Long, SignalStrength::Moderate) => RecommendedAction::Monitor,
            (ExpectedDirection::Short, SignalStrength::Moderate) => RecommendedAction::Ignore,
            (ExpectedDirection::Short, _) => RecommendedAction::Monitor,
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::Ignore => write!(f, "IGNORE"),
            RecommendedAction::Monitor => write!(f, "MONITOR"),
            RecommendedAction::Buy => write!(f, "BUY"),
            RecommendedAction::StrongBuy => write!(f, "STRONG_BUY"),
        }
    }
}

/// An emitted institutional flow signal, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionalSignal {
    /// Instrument the signal was generated for
    pub key: InstrumentKey,
    /// Derived pressure ratio of the triggering observation
    pub pressure_ratio: f64,
    /// Weighted pressure-analysis confidence before baseline blending
    pub raw_confidence: f64,
    /// Baseline anomaly confidence component
    pub baseline_confidence: f64,
    /// Penalty applied for suspected market-making activity
    pub market_making_penalty: f64,
    /// Bonus for cross-strike directional corroboration
    pub coordination_bonus: f64,
    /// Final blended confidence (0-1)
    pub final_confidence: f64,
    /// Discrete strength bucket of the final confidence
    pub signal_strength: SignalStrength,
    /// Recommended downstream action
    pub recommended_action: RecommendedAction,
    /// Expected direction of the institutional flow
    pub expected_direction: ExpectedDirection,
    /// Emission timestamp (window end of the triggering observation)
    pub timestamp: DateTime<Utc>,
}
