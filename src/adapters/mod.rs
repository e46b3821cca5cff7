//! Adapters Module
//!
//! Concrete `BaselineStore` implementations: an in-memory store for tests
//! and single-process deployments, and an append-only JSONL store for
//! durable history across restarts.

pub mod jsonl_store;
pub mod memory_store;

pub use jsonl_store::JsonlBaselineStore;
pub use memory_store::InMemoryBaselineStore;
