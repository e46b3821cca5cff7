//! Configuration Module
//!
//! Detection parameters with validation, plus TOML file loading.

pub mod loader;
pub mod params;

pub use loader::{load_config, ConfigFileError};
pub use params::{
    BaselineSection, ConfigError, EngineSection, IfdConfig, MarketMakingSection, PressureSection,
    ScoringSection,
};
