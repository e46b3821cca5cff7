//! Ports Module
//!
//! Trait seams between the engine and its collaborators. The baseline
//! store is the only component shared across concurrent engine instances,
//! so it is the only port.

pub mod baseline_store;

pub use baseline_store::{BaselineStore, StoreError};
