//! Confidence Scorer
//!
//! Pure multi-factor confidence blend. Combines the real-time pressure
//! analysis, the historical baseline context, and the market-making
//! analysis into a final 0-1 confidence, returning every component so
//! downstream consumers can audit the decomposition.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

use crate::config::params::{ConfigError, ScoringSection};
use crate::domain::baseline::BaselineContext;
use crate::strategy::clip01;
use crate::strategy::market_making_detector::MarketMakingAnalysis;
use crate::strategy::pressure_analyzer::PressureAnalysis;

/// Full decomposition of one confidence computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    /// Weighted pressure-analysis score before baseline blending
    pub raw_confidence: f64,
    /// Baseline anomaly component: 0.5 neutral, scaling toward 1.0
    pub baseline_confidence: f64,
    /// Market-making penalty applied multiplicatively
    pub market_making_penalty: f64,
    /// Cross-strike corroboration bonus, capped
    pub coordination_bonus: f64,
    /// Final blended confidence (0-1)
    pub final_confidence: f64,
}

/// Stateless scorer; all weights validated at construction.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ScoringSection,
}

impl ConfidenceScorer {
    /// Fails fast on malformed weights, never per-event.
    pub fn new(config: ScoringSection) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Blend the three analyses plus cross-strike corroboration:
    /// `final = clip01(blend(raw, baseline) * (1 - penalty) + bonus)`
    pub fn score(
        &self,
        pressure: &PressureAnalysis,
        baseline: &BaselineContext,
        market_making: &MarketMakingAnalysis,
        coordination_count: usize,
    ) -> ConfidenceBreakdown {
        let raw_confidence = clip01(
            self.config.significance_weight * pressure.pressure_significance
                + self.config.trend_weight * pressure.trend_strength
                + self.config.concentration_weight * pressure.volume_concentration
                + self.config.persistence_weight * pressure.time_persistence,
        );

        let baseline_confidence = Self::baseline_confidence(baseline);
        let market_making_penalty = clip01(market_making.market_making_score);

        let coordination_bonus = (coordination_count as f64
            * self.config.coordination_bonus_per_strike)
            .min(self.config.max_coordination_bonus);

        let blended = self.config.pressure_blend_weight * raw_confidence
            + self.config.baseline_blend_weight * baseline_confidence;
        let final_confidence = clip01(blended * (1.0 - market_making_penalty) + coordination_bonus);

        ConfidenceBreakdown {
            raw_confidence,
            baseline_confidence,
            market_making_penalty,
            coordination_bonus,
            final_confidence,
        }
    }

    /// 0.5 (neutral) without an anomaly; otherwise the standard normal CDF
    /// of the z-score magnitude, saturating toward 1.0.
    fn baseline_confidence(baseline: &BaselineContext) -> f64 {
        if !baseline.anomaly_detected {
            return 0.5;
        }
        let z = baseline.current_zscore.abs();
        // Phi(z) = 0.5 * (1 + erf(z / sqrt(2)))
        let phi = 0.5 * (1.0 + erf(z / f64::sqrt(2.0)));
        phi.clamp(0.5, 1.0)
    }
}
