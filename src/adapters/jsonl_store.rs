//! JSONL Baseline Store
//!
//! Durable append-only log: one JSON record per observation, one line per
//! record. The full file replays into an in-memory day index at open, so
//! reads never touch disk. Write failures surface as `StoreError` and the
//! engine degrades rather than aborting analysis.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::adapters::memory_store::{aggregates_from_index, DayIndex};
use crate::domain::baseline::{DailyAggregate, PressureObservation};
use crate::domain::metrics::InstrumentKey;
use crate::ports::baseline_store::{BaselineStore, StoreError};

/// One persisted line of the log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    key: InstrumentKey,
    date: NaiveDate,
    observation: PressureObservation,
}

struct JsonlState {
    file: File,
    index: DayIndex,
}

/// Append-only JSONL-backed baseline store. The log and the replayed index
/// are guarded by one mutex, serializing writes per store instance.
pub struct JsonlBaselineStore {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl JsonlBaselineStore {
    /// Open (or create) the log at `path`, replaying existing records into
    /// the in-memory index. A corrupted line fails the open: durable
    /// history must not be silently truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        }

        let mut index = DayIndex::default();
        let mut replayed = 0usize;
        if path.exists() {
            let reader = BufReader::new(
                File::open(&path).map_err(|e| StoreError::ReadFailed(e.to_string()))?,
            );
            for (line_no, line) in reader.lines().enumerate() {
                let line = line.map_err(|e| StoreError::ReadFailed(e.to_string()))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: StoredRecord = serde_json::from_str(&line).map_err(|e| {
                    StoreError::Corrupted(format!("line {}: {}", line_no + 1, e))
                })?;
                index
                    .entry(record.key)
                    .or_default()
                    .entry(record.date)
                    .or_default()
                    .add(&record.observation);
                replayed += 1;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        if replayed > 0 {
            tracing::info!(
                "Baseline log replayed: {} observations from {}",
                replayed,
                path.display()
            );
        }

        Ok(Self {
            path,
            state: Mutex::new(JsonlState { file, index }),
        })
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BaselineStore for JsonlBaselineStore {
    async fn append_observation(
        &self,
        key: &InstrumentKey,
        date: NaiveDate,
        observation: &PressureObservation,
    ) -> Result<(), StoreError> {
        let record = StoredRecord {
            key: key.clone(),
            date,
            observation: observation.clone(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        let mut state = self.state.lock().await;
        writeln!(state.file, "{}", line).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        state
            .file
            .flush()
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        state
            .index
            .entry(key.clone())
            .or_default()
            .entry(date)
            .or_default()
            .add(observation);
        Ok(())
    }

    async fn query_daily_aggregates(
        &self,
        key: &InstrumentKey,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAggregate>, StoreError> {
        let state = self.state.lock().await;
        Ok(aggregates_from_index(&state.index, key, from, to))
    }
}
