//! Market Making Detector
//!
//! Heuristic false-positive filter for coordinated non-directional
//! activity. Cross-references CALL and PUT prints at the same strike to
//! spot straddle coordination and volatility crush, then grades how likely
//! the observed pressure is market making rather than directional flow.
//!
//! Absence of opposite-side data never blocks a one-sided signal; it only
//! fails to penalize it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::params::MarketMakingSection;
use crate::domain::metrics::{OptionType, PressureMetrics};
use crate::strategy::clip01;

/// Filter verdict for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterRecommendation {
    Accept,
    Monitor,
    Reject,
}

impl fmt::Display for FilterRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRecommendation::Accept => write!(f, "ACCEPT"),
            FilterRecommendation::Monitor => write!(f, "MONITOR"),
            FilterRecommendation::Reject => write!(f, "REJECT"),
        }
    }
}

/// Market-making analysis for one observation.
///
/// Price declines are proxied by pressure-ratio declines: the engine sees
/// pre-aggregated flow summaries, not quotes, and a side whose pressure
/// collapses inside the window behaves like a decaying/expiring side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMakingAnalysis {
    /// Call-side volume involved in the suspected straddle
    pub straddle_call_volume: u64,
    /// Put-side volume involved in the suspected straddle
    pub straddle_put_volume: u64,
    /// Seconds between the call and put prints, if both sides were seen
    pub straddle_time_coordination_seconds: Option<f64>,
    /// Probability the observation is one leg of a straddle (0-1)
    pub straddle_probability: f64,
    /// Call side pressure declining vs its previous print
    pub call_price_decline: bool,
    /// Put side pressure declining vs its previous print
    pub put_price_decline: bool,
    /// Both sides declining simultaneously within the window
    pub both_sides_declining: bool,
    /// Probability the activity is volatility crush (0-1)
    pub volatility_crush_probability: f64,
    /// Combined market-making score (0-1)
    pub market_making_score: f64,
    /// 1 - market_making_score
    pub institutional_likelihood: f64,
    /// Accept / monitor / reject verdict from configured thresholds
    pub filter_recommendation: FilterRecommendation,
}

/// Most recent print for one side of a strike
#[derive(Debug, Clone, Copy)]
struct SidePrint {
    timestamp: DateTime<Utc>,
    total_volume: u64,
    /// Relative pressure decline vs this side's previous print (0 if none)
    decline_frac: f64,
}

#[derive(Debug, Default)]
struct StrikeSides {
    call: Option<SidePrint>,
    put: Option<SidePrint>,
    /// Last ratio per side, kept to compute the next print's decline
    last_call_ratio: Option<f64>,
    last_put_ratio: Option<f64>,
}

impl StrikeSides {
    fn side(&self, option_type: OptionType) -> Option<&SidePrint> {
        match option_type {
            OptionType::Call => self.call.as_ref(),
            OptionType::Put => self.put.as_ref(),
        }
    }

    fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        match (self.call.as_ref(), self.put.as_ref()) {
            (Some(c), Some(p)) => Some(c.timestamp.max(p.timestamp)),
            (Some(c), None) => Some(c.timestamp),
            (None, Some(p)) => Some(p.timestamp),
            (None, None) => None,
        }
    }
}

/// Cross-instrument detector, stateful per strike. The per-strike index is
/// TTL-evicted so long sessions stay bounded.
#[derive(Debug)]
pub struct MarketMakingDetector {
    config: MarketMakingSection,
    strikes: HashMap<Decimal, StrikeSides>,
}

impl MarketMakingDetector {
    pub fn new(config: MarketMakingSection) -> Self {
        Self {
            config,
            strikes: HashMap::new(),
        }
    }

    /// Analyze one observation against the opposite side of its strike,
    /// then record the observation for future cross-referencing.
    pub fn detect(&mut self, metrics: &PressureMetrics) -> MarketMakingAnalysis {
        let now = metrics.window_end;
        self.evict_stale(now);

        let strike = metrics.key.strike;
        let side = metrics.key.option_type;
        let ratio = metrics.pressure_ratio();
        let window = Duration::seconds(self.config.straddle_time_window_secs as i64);

        let entry = self.strikes.entry(strike).or_default();

        // Straddle: matching-strike print on the opposite side within the window
        let opposite = entry.side(side.opposite()).copied();
        let (straddle_probability, coordination_secs, opposite_volume) = match opposite {
            Some(print) if (now - print.timestamp).abs() <= window => {
                let dt = (now - print.timestamp).abs().num_milliseconds() as f64 / 1000.0;
                let time_proximity = 1.0 - dt / window.num_seconds() as f64;
                let volume_similarity = Self::volume_similarity(
                    metrics.total_volume(),
                    print.total_volume,
                );
                (
                    clip01(time_proximity * volume_similarity),
                    Some(dt),
                    print.total_volume,
                )
            }
            _ => (0.0, None, 0),
        };

        // Volatility crush: both sides' pressure decaying inside the window
        let current_decline = Self::decline_frac(entry, side, ratio);
        let opposite_decline = match opposite {
            Some(print) if (now - print.timestamp).abs() <= window => print.decline_frac,
            _ => 0.0,
        };
        let threshold = self.config.volatility_crush_threshold;
        let (current_declining, opposite_declining) = (
            current_decline >= threshold,
            opposite_decline >= threshold,
        );
        let both_sides_declining = current_declining && opposite_declining;
        let volatility_crush_probability = if both_sides_declining {
            clip01((current_decline + opposite_decline) / (4.0 * threshold))
        } else {
            0.0
        };

        let market_making_score = clip01(
            self.config.straddle_weight * straddle_probability
                + self.config.crush_weight * volatility_crush_probability,
        );

        let filter_recommendation = if market_making_score >= self.config.reject_threshold {
            FilterRecommendation::Reject
        } else if market_making_score >= self.config.monitor_threshold {
            FilterRecommendation::Monitor
        } else {
            FilterRecommendation::Accept
        };

        let (call_decline, put_decline) = match side {
            OptionType::Call => (current_declining, opposite_declining),
            OptionType::Put => (opposite_declining, current_declining),
        };
        let (call_volume, put_volume) = match side {
            OptionType::Call => (metrics.total_volume(), opposite_volume),
            OptionType::Put => (opposite_volume, metrics.total_volume()),
        };

        // Record this print for the opposite side's future lookups
        Self::record(entry, side, now, metrics.total_volume(), ratio, current_decline);

        MarketMakingAnalysis {
            straddle_call_volume: call_volume,
            straddle_put_volume: put_volume,
            straddle_time_coordination_seconds: coordination_secs,
            straddle_probability,
            call_price_decline: call_decline,
            put_price_decline: put_decline,
            both_sides_declining,
            volatility_crush_probability,
            market_making_score,
            institutional_likelihood: 1.0 - market_making_score,
            filter_recommendation,
        }
    }

    /// Strikes currently tracked
    pub fn tracked_strikes(&self) -> usize {
        self.strikes.len()
    }

    fn evict_stale(&mut self, now: DateTime<Utc>) {
        let ttl = Duration::seconds(self.config.index_ttl_secs as i64);
        self.strikes.retain(|_, sides| {
            sides
                .newest_timestamp()
                .map(|ts| now - ts <= ttl)
                .unwrap_or(false)
        });
    }

    fn volume_similarity(a: u64, b: u64) -> f64 {
        let (min, max) = (a.min(b), a.max(b));
        if max == 0 {
            return 0.0;
        }
        min as f64 / max as f64
    }

    fn decline_frac(entry: &StrikeSides, side: OptionType, ratio: f64) -> f64 {
        let previous = match side {
            OptionType::Call => entry.last_call_ratio,
            OptionType::Put => entry.last_put_ratio,
        };
        match previous {
            Some(prev) if prev > 0.0 => ((prev - ratio) / prev).max(0.0),
            _ => 0.0,
        }
    }

    fn record(
        entry: &mut StrikeSides,
        side: OptionType,
        timestamp: DateTime<Utc>,
        total_volume: u64,
        ratio: f64,
        decline_frac: f64,
    ) {
        let print = SidePrint {
            timestamp,
            total_volume,
            decline_frac,
        };
        match side {
            OptionType::Call => {
                entry.call = Some(print);
                entry.last_call_ratio = Some(ratio);
            }
            OptionType::Put => {
                entry.put = Some(print);
                entry.last_put_ratio = Some(ratio);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{DominantSide, InstrumentKey};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn metrics(
        strike: Decimal,
        option_type: OptionType,
        second: u32,
        bid: u64,
        ask: u64,
    ) -> PressureMetrics {
        let end = Utc
            .with_ymd_and_hms(2026, 6, 15, 10, 0, 0)
            .unwrap()
            + Duration::seconds(second as i64);
        PressureMetrics {
            key: InstrumentKey::new(strike, option_type),
            window_start: end - Duration::minutes(1),
            window_end: end,
            bid_volume: bid,
            ask_volume: ask,
            provider_pressure_ratio: None,
            total_trades: 20,
            avg_trade_size: 10.0,
            dominant_side: DominantSide::Buy,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_no_opposite_side_means_zero_straddle() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 0, 100, 400));

        assert_eq!(analysis.straddle_probability, 0.0);
        assert_eq!(analysis.straddle_time_coordination_seconds, None);
        assert_eq!(analysis.market_making_score, 0.0);
        assert_eq!(analysis.institutional_likelihood, 1.0);
        assert_eq!(analysis.filter_recommendation, FilterRecommendation::Accept);
    }

    #[test]
    fn test_coordinated_straddle_is_penalized() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        // Same strike, opposite type, same volume, 10 seconds later
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 10, 200, 300));

        assert!(analysis.straddle_probability > 0.9);
        assert_eq!(analysis.straddle_time_coordination_seconds, Some(10.0));
        assert_eq!(analysis.straddle_call_volume, 500);
        assert_eq!(analysis.straddle_put_volume, 500);
        assert!(analysis.market_making_score > 0.5);
        assert_ne!(analysis.filter_recommendation, FilterRecommendation::Accept);
    }

    #[test]
    fn test_straddle_probability_decays_with_time() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        let near = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 10, 200, 300));

        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        let far = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 250, 200, 300));

        assert!(near.straddle_probability > far.straddle_probability);
    }

    #[test]
    fn test_straddle_probability_decays_with_volume_mismatch() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        let similar = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 10, 200, 300));

        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        let dissimilar = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 10, 20, 30));

        assert!(similar.straddle_probability > dissimilar.straddle_probability);
    }

    #[test]
    fn test_opposite_side_outside_window_is_ignored() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        // 400 seconds later: outside the 300s straddle window
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 400, 200, 300));

        assert_eq!(analysis.straddle_probability, 0.0);
    }

    #[test]
    fn test_different_strikes_do_not_cross_match() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21800.0), OptionType::Put, 0, 200, 300));
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 10, 200, 300));

        assert_eq!(analysis.straddle_probability, 0.0);
        assert_eq!(detector.tracked_strikes(), 2);
    }

    #[test]
    fn test_volatility_crush_requires_both_sides_declining() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());

        // Establish both sides, then decay them
        detector.detect(&metrics(dec!(21900.0), OptionType::Call, 0, 100, 400));
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 10, 100, 400));
        // Put pressure collapses (4.0 -> 2.0)
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 60, 100, 200));
        // Call pressure collapses too (4.0 -> 2.0): both sides now declining
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 70, 100, 200));

        assert!(analysis.call_price_decline);
        assert!(analysis.put_price_decline);
        assert!(analysis.both_sides_declining);
        assert!(analysis.volatility_crush_probability > 0.5);
    }

    #[test]
    fn test_single_side_decline_is_not_crush() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21900.0), OptionType::Call, 0, 100, 400));
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 60, 100, 200));

        assert!(!analysis.both_sides_declining);
        assert_eq!(analysis.volatility_crush_probability, 0.0);
    }

    #[test]
    fn test_stale_strikes_are_evicted() {
        let mut detector = MarketMakingDetector::new(MarketMakingSection::default());
        detector.detect(&metrics(dec!(21800.0), OptionType::Call, 0, 100, 300));
        assert_eq!(detector.tracked_strikes(), 1);

        // Well past the 900s index TTL
        detector.detect(&metrics(dec!(21900.0), OptionType::Call, 2000, 100, 300));
        assert_eq!(detector.tracked_strikes(), 1);
    }

    #[test]
    fn test_recommendation_bands() {
        let config = MarketMakingSection::default();
        let mut detector = MarketMakingDetector::new(config.clone());

        // Perfect straddle: score = straddle_weight * ~1.0 = 0.6, within
        // the monitor band [0.4, 0.7)
        detector.detect(&metrics(dec!(21900.0), OptionType::Put, 0, 200, 300));
        let analysis = detector.detect(&metrics(dec!(21900.0), OptionType::Call, 1, 200, 300));
        assert_eq!(analysis.filter_recommendation, FilterRecommendation::Monitor);
    }
}
