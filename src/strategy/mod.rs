//! Strategy Module
//!
//! The three analytical components of the pipeline: real-time pressure
//! analysis, market-making detection, and the pure confidence blend.

pub mod confidence_scorer;
pub mod market_making_detector;
pub mod pressure_analyzer;

pub use confidence_scorer::{ConfidenceBreakdown, ConfidenceScorer};
pub use market_making_detector::{FilterRecommendation, MarketMakingAnalysis, MarketMakingDetector};
pub use pressure_analyzer::{PressureAnalysis, PressureRatioAnalyzer};

/// Clamp a score into [0, 1]
pub(crate) fn clip01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
