//! Application Layer
//!
//! Orchestration over the domain and strategy layers: rolling history
//! management and the detection engine itself.

pub mod baseline_manager;
pub mod engine;

pub use baseline_manager::HistoricalBaselineManager;
pub use engine::{AnalysisSummary, EngineError, IfdEngine, StrengthCounts};
