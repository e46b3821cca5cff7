//! Pressure Ratio Analyzer
//!
//! Real-time multi-window analysis of per-strike pressure. Maintains a
//! short, strictly bounded sliding window per instrument key and scores
//! each new observation on significance, trend, clustering, concentration,
//! and persistence - all in [0, 1].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::params::PressureSection;
use crate::domain::metrics::{DominantSide, InstrumentKey, PressureMetrics};
use crate::strategy::clip01;

/// Real-time analysis scores for one observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureAnalysis {
    /// How notable the ratio is, volume-weighted (0-1)
    pub pressure_significance: f64,
    /// Sign-consistency of the ratio trend across the window (0-1)
    pub trend_strength: f64,
    /// Share of window observations clustered near the current one (0-1)
    pub cluster_coordination: f64,
    /// How lopsided the current observation's flow is (0-1)
    pub volume_concentration: f64,
    /// Share of window observations agreeing with the current side (0-1)
    pub time_persistence: f64,
}

/// One retained window entry
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    timestamp: DateTime<Utc>,
    pressure_ratio: f64,
    dominant_side: DominantSide,
}

/// Stateful per-key sliding-window analyzer. Windows are bounded both by
/// observation count and by age; eviction happens on every call.
#[derive(Debug)]
pub struct PressureRatioAnalyzer {
    config: PressureSection,
    windows: HashMap<InstrumentKey, VecDeque<WindowEntry>>,
}

impl PressureRatioAnalyzer {
    pub fn new(config: PressureSection) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Analyze one observation against its key's window, then fold the
    /// observation into the window. Deterministic for identical input on
    /// identical window state.
    pub fn analyze(&mut self, metrics: &PressureMetrics) -> PressureAnalysis {
        let now = metrics.window_end;
        let ratio = metrics.pressure_ratio();

        let window = self.windows.entry(metrics.key.clone()).or_default();
        Self::evict(window, now, &self.config);

        let significance = Self::significance(ratio, metrics.total_volume(), &self.config);
        let trend = Self::trend_strength(window, ratio);
        let clustering = Self::cluster_coordination(window, now, &self.config);
        let persistence = Self::time_persistence(window, metrics.dominant_side, &self.config);

        window.push_back(WindowEntry {
            timestamp: now,
            pressure_ratio: ratio,
            dominant_side: metrics.dominant_side,
        });
        while window.len() > self.config.window_max_observations {
            window.pop_front();
        }

        PressureAnalysis {
            pressure_significance: significance,
            trend_strength: trend,
            cluster_coordination: clustering,
            volume_concentration: metrics.volume_concentration(),
            time_persistence: persistence,
        }
    }

    /// Observations currently retained for a key
    pub fn window_len(&self, key: &InstrumentKey) -> usize {
        self.windows.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Drop all window state
    pub fn reset(&mut self) {
        self.windows.clear();
    }

    fn evict(window: &mut VecDeque<WindowEntry>, now: DateTime<Utc>, config: &PressureSection) {
        let max_age = Duration::seconds(config.window_max_age_secs as i64);
        while let Some(front) = window.front() {
            if now - front.timestamp > max_age {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Directional extremity of the ratio: distance from balance, measured
    /// symmetrically for buy (>1) and sell (<1) pressure.
    fn extremity(ratio: f64) -> f64 {
        if ratio >= 1.0 {
            ratio - 1.0
        } else if ratio > 0.0 {
            1.0 / ratio - 1.0
        } else {
            0.0
        }
    }

    /// Monotone in both ratio extremity and volume weight: a large skewed
    /// trade outweighs a tiny one at the same ratio.
    fn significance(ratio: f64, total_volume: u64, config: &PressureSection) -> f64 {
        let weight = (1.0 + total_volume as f64).ln();
        clip01(Self::extremity(ratio) * weight / config.significance_scale)
    }

    /// Sign-consistency of successive ratio moves over the window plus the
    /// current observation. 0 with fewer than two points.
    fn trend_strength(window: &VecDeque<WindowEntry>, current_ratio: f64) -> f64 {
        let ratios: Vec<f64> = window
            .iter()
            .map(|e| e.pressure_ratio)
            .chain(std::iter::once(current_ratio))
            .collect();
        if ratios.len() < 2 {
            return 0.0;
        }

        let mut signed = 0i64;
        let mut moves = 0i64;
        for pair in ratios.windows(2) {
            let diff = pair[1] - pair[0];
            if diff > 0.0 {
                signed += 1;
            } else if diff < 0.0 {
                signed -= 1;
            }
            moves += 1;
        }
        signed.unsigned_abs() as f64 / moves as f64
    }

    fn cluster_coordination(
        window: &VecDeque<WindowEntry>,
        now: DateTime<Utc>,
        config: &PressureSection,
    ) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let interval = Duration::seconds(config.cluster_interval_secs as i64);
        let clustered = window
            .iter()
            .filter(|e| (now - e.timestamp).abs() <= interval)
            .count();
        clustered as f64 / window.len() as f64
    }

    fn time_persistence(
        window: &VecDeque<WindowEntry>,
        current_side: DominantSide,
        config: &PressureSection,
    ) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let agreeing = window
            .iter()
            .filter(|e| {
                e.dominant_side == current_side
                    && Self::extremity(e.pressure_ratio)
                        >= Self::extremity(config.min_pressure_ratio)
            })
            .count();
        agreeing as f64 / window.len() as f64
    }
}
