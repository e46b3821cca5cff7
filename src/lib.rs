//! IFD Core - Institutional Flow Detection Engine Library
//!
//! A streaming anomaly-detection and scoring engine for per-strike options
//! order-flow pressure. Ingests discrete pressure observations, checks them
//! against rolling historical baselines, filters out market-making activity,
//! and emits confidence-scored institutional signals.
//!
//! # Modules
//!
//! - `domain`: Core business types (PressureMetrics, BaselineContext, InstitutionalSignal)
//! - `ports`: Trait abstractions (BaselineStore)
//! - `adapters`: Store implementations (in-memory, append-only JSONL)
//! - `strategy`: Analytical components (PressureRatioAnalyzer, MarketMakingDetector, ConfidenceScorer)
//! - `application`: Orchestration (HistoricalBaselineManager, IfdEngine)
//! - `config`: Configuration loading and validation

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod strategy;
pub mod application;
pub mod config;
