//! Detection Engine
//!
//! Orchestrates the full pipeline for one pressure observation: input
//! validation, history persistence, baseline comparison, real-time pressure
//! analysis, market-making filtering, cross-strike corroboration, and the
//! final confidence blend. Emits at most one signal per observation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::baseline_manager::HistoricalBaselineManager;
use crate::config::params::{ConfigError, IfdConfig};
use crate::domain::baseline::PressureObservation;
use crate::domain::metrics::{MetricsError, PressureMetrics};
use crate::domain::signal::{
    ExpectedDirection, InstitutionalSignal, RecommendedAction, SignalStrength,
};
use crate::ports::baseline_store::BaselineStore;
use crate::strategy::confidence_scorer::ConfidenceScorer;
use crate::strategy::market_making_detector::{FilterRecommendation, MarketMakingDetector};
use crate::strategy::pressure_analyzer::PressureRatioAnalyzer;

/// Per-event analysis errors. Only malformed input aborts an event; store
/// and history problems degrade inside the pipeline instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid pressure metrics: {0}")]
    InvalidMetrics(#[from] MetricsError),
}

/// Signal strength distribution over the recent-signal buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrengthCounts {
    pub moderate: usize,
    pub high: usize,
    pub very_high: usize,
    pub extreme: usize,
}

/// Point-in-time engine statistics, recomputed on request
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    /// Observations accepted for analysis since construction
    pub events_processed: u64,
    /// Signals emitted since construction
    pub signals_emitted: u64,
    /// Scored observations suppressed by filtering or thresholds
    pub signals_suppressed: u64,
    /// Signals currently held in the recent buffer
    pub buffered_signals: usize,
    /// Mean final confidence across the buffer
    pub avg_confidence: f64,
    /// Strength distribution across the buffer
    pub strength_counts: StrengthCounts,
    /// Timestamp of the newest buffered signal
    pub last_signal_at: Option<DateTime<Utc>>,
}

/// The institutional flow detection engine.
///
/// Single-writer by construction (`&mut self` analysis); share the
/// underlying [`BaselineStore`] across engines, not the engine itself.
pub struct IfdEngine {
    config: IfdConfig,
    baseline: HistoricalBaselineManager,
    analyzer: PressureRatioAnalyzer,
    detector: MarketMakingDetector,
    scorer: ConfidenceScorer,
    recent: VecDeque<InstitutionalSignal>,
    /// Last observed flow direction per strike, for cross-strike
    /// corroboration. Keyed by strike only: calls and puts at one strike
    /// share directional evidence.
    directions: HashMap<Decimal, (ExpectedDirection, DateTime<Utc>)>,
    events_processed: u64,
    signals_emitted: u64,
    signals_suppressed: u64,
}

impl IfdEngine {
    /// Build an engine over a shared baseline store. All configuration is
    /// validated here; a running engine never sees malformed parameters.
    pub fn new(config: IfdConfig, store: Arc<dyn BaselineStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let baseline = HistoricalBaselineManager::new(store, config.baseline.clone());
        let analyzer = PressureRatioAnalyzer::new(config.pressure.clone());
        let detector = MarketMakingDetector::new(config.market_making.clone());
        let scorer = ConfidenceScorer::new(config.scoring.clone())?;
        let recent = VecDeque::with_capacity(config.engine.recent_signal_capacity);
        Ok(Self {
            config,
            baseline,
            analyzer,
            detector,
            scorer,
            recent,
            directions: HashMap::new(),
            events_processed: 0,
            signals_emitted: 0,
            signals_suppressed: 0,
        })
    }

    /// Run the full pipeline for one observation.
    ///
    /// Returns `Ok(None)` when the observation is valid but does not
    /// produce a signal: gated out, filtered as market making, or below
    /// the confidence floor. Returns `Err` only for malformed input.
    pub async fn analyze_pressure_event(
        &mut self,
        metrics: &PressureMetrics,
    ) -> Result<Option<InstitutionalSignal>, EngineError> {
        metrics.validate()?;
        self.events_processed += 1;

        let ratio = metrics.pressure_ratio();
        let now = metrics.window_end;

        // History is best-effort: a failing store must not stop detection.
        let observation = PressureObservation {
            timestamp: now,
            pressure_ratio: ratio,
            bid_volume: metrics.bid_volume,
            ask_volume: metrics.ask_volume,
            total_trades: metrics.total_trades,
        };
        if let Err(err) = self.baseline.update_history(&metrics.key, &observation).await {
            warn!(key = %metrics.key, error = %err, "History write failed; continuing without it");
        }

        if !self.passes_gate(metrics, ratio) {
            debug!(
                key = %metrics.key,
                ratio,
                volume = metrics.total_volume(),
                confidence = metrics.confidence,
                "Observation gated out before scoring"
            );
            return Ok(None);
        }

        let base = self
            .baseline
            .baseline_context(&metrics.key, now.date_naive())
            .await;
        let context = self.baseline.compute_pressure_context(ratio, &base);

        let pressure = self.analyzer.analyze(metrics);
        let market_making = self.detector.detect(metrics);

        let direction = ExpectedDirection::from_flow(metrics.dominant_side, ratio);
        let coordination_count = self.coordinated_strikes(metrics.key.strike, direction, now);
        self.directions.insert(metrics.key.strike, (direction, now));

        let breakdown = self
            .scorer
            .score(&pressure, &context, &market_making, coordination_count);

        if market_making.filter_recommendation == FilterRecommendation::Reject {
            self.signals_suppressed += 1;
            debug!(
                key = %metrics.key,
                mm_score = market_making.market_making_score,
                "Suppressed: market-making pattern"
            );
            return Ok(None);
        }
        if breakdown.final_confidence < self.config.engine.min_final_confidence {
            self.signals_suppressed += 1;
            debug!(
                key = %metrics.key,
                final_confidence = breakdown.final_confidence,
                floor = self.config.engine.min_final_confidence,
                "Suppressed: below confidence floor"
            );
            return Ok(None);
        }

        let signal_strength = SignalStrength::from_confidence(breakdown.final_confidence);
        let recommended_action =
            RecommendedAction::from_direction_and_strength(direction, signal_strength);
        let signal = InstitutionalSignal {
            key: metrics.key.clone(),
            pressure_ratio: ratio,
            raw_confidence: breakdown.raw_confidence,
            baseline_confidence: breakdown.baseline_confidence,
            market_making_penalty: breakdown.market_making_penalty,
            coordination_bonus: breakdown.coordination_bonus,
            final_confidence: breakdown.final_confidence,
            signal_strength,
            recommended_action,
            expected_direction: direction,
            timestamp: now,
        };

        info!(
            key = %signal.key,
            ratio = signal.pressure_ratio,
            final_confidence = signal.final_confidence,
            strength = %signal.signal_strength,
            action = %signal.recommended_action,
            direction = %signal.expected_direction,
            "Institutional flow signal emitted"
        );

        self.signals_emitted += 1;
        self.push_recent(signal.clone());
        Ok(Some(signal))
    }

    /// Most recent signals first, at most `limit` of them
    pub fn recent_signals(&self, limit: usize) -> Vec<InstitutionalSignal> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Recomputed statistics over the counters and the recent buffer
    pub fn analysis_summary(&self) -> AnalysisSummary {
        let mut strength_counts = StrengthCounts::default();
        let mut confidence_sum = 0.0;
        for signal in &self.recent {
            confidence_sum += signal.final_confidence;
            match signal.signal_strength {
                SignalStrength::Moderate => strength_counts.moderate += 1,
                SignalStrength::High => strength_counts.high += 1,
                SignalStrength::VeryHigh => strength_counts.very_high += 1,
                SignalStrength::Extreme => strength_counts.extreme += 1,
            }
        }
        let buffered_signals = self.recent.len();
        let avg_confidence = if buffered_signals == 0 {
            0.0
        } else {
            confidence_sum / buffered_signals as f64
        };
        AnalysisSummary {
            events_processed: self.events_processed,
            signals_emitted: self.signals_emitted,
            signals_suppressed: self.signals_suppressed,
            buffered_signals,
            avg_confidence,
            strength_counts,
            last_signal_at: self.recent.back().map(|s| s.timestamp),
        }
    }

    /// Cheap filters applied before any store or analysis work. A ratio is
    /// interesting when lopsided in either direction beyond the configured
    /// minimum.
    fn passes_gate(&self, metrics: &PressureMetrics, ratio: f64) -> bool {
        let pressure = &self.config.pressure;
        if metrics.total_volume() < pressure.min_total_volume {
            return false;
        }
        if metrics.confidence < pressure.min_confidence {
            return false;
        }
        ratio >= pressure.min_pressure_ratio || ratio <= 1.0 / pressure.min_pressure_ratio
    }

    /// Count nearby strikes that recently moved in the same direction.
    /// Stale entries are evicted by event time, keeping replays
    /// deterministic.
    fn coordinated_strikes(
        &mut self,
        strike: Decimal,
        direction: ExpectedDirection,
        now: DateTime<Utc>,
    ) -> usize {
        let window = Duration::seconds(self.config.engine.coordination_window_secs as i64);
        self.directions.retain(|_, (_, seen)| now - *seen <= window);

        let band = self.config.engine.coordination_strike_band_pct / 100.0;
        let Some(own) = strike.to_f64() else {
            return 0;
        };
        self.directions
            .iter()
            .filter(|(other_strike, (other_direction, _))| {
                if **other_strike == strike || *other_direction != direction {
                    return false;
                }
                match other_strike.to_f64() {
                    Some(other) if own > 0.0 => ((other - own) / own).abs() <= band,
                    _ => false,
                }
            })
            .count()
    }

    fn push_recent(&mut self, signal: InstitutionalSignal) {
        if self.recent.len() >= self.config.engine.recent_signal_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(signal);
    }
}
