//! Core types for transactional log failure detection
//! this crate holds the record schema and the record store shared by the detector and the cli.
pub mod store;
pub mod timestamp;

pub use store::{load, load_with, ColumnMapping, LoadError, RawTable, SchemaError};
pub use timestamp::{parse_timestamp, ParseError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// default level label that marks a record as error-level
pub const ERROR_LEVEL: &str = "ERROR";

// LOG RECORD //

/// One row of the loaded log table.
/// Identity is the position inside its batch, there is no stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>, // when the log was generated

    pub level: String, // free text label (INFO, ERROR, WARN ...)

    pub message: String, // the log message
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Utc>, level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level: level.into(),
            message: message.into(),
        }
    }

    // exact comparison, "error" is not "ERROR"
    pub fn has_level(&self, level: &str) -> bool {
        self.level == level
    }
}

// LOG BATCH //

/// Ordered set of records produced by one load.
///
/// Every timestamp is a valid instant. Order is the source order, it is not sorted.
/// Each batch gets a fresh id so a detection result can be tied to the exact
/// snapshot it was computed from.
#[derive(Debug, Clone)]
pub struct LogBatch {
    id: Uuid,
    records: Vec<LogRecord>,
    dropped_rows: usize,
}

impl LogBatch {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self::with_dropped(records, 0)
    }

    // batch plus the count of rows discarded during normalization
    pub fn with_dropped(records: Vec<LogRecord>, dropped_rows: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            records,
            dropped_rows,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&LogRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    /// (index, record) pairs of every record carrying `level`
    pub fn with_level<'a>(&'a self, level: &'a str) -> impl Iterator<Item = (usize, &'a LogRecord)> + 'a {
        self.records
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.has_level(level))
    }

    // earliest and latest timestamp, None for an empty batch
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.records.iter().map(|r| r.timestamp).min()?;
        let last = self.records.iter().map(|r| r.timestamp).max()?;
        Some((first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_time_bounds_ignore_order() {
        let batch = LogBatch::new(vec![
            LogRecord::new(at(10), "INFO", "b"),
            LogRecord::new(at(3), "ERROR", "a"),
            LogRecord::new(at(7), "INFO", "c"),
        ]);
        assert_eq!(batch.time_bounds(), Some((at(3), at(10))));
        assert_eq!(LogBatch::empty().time_bounds(), None);
    }

    #[test]
    fn test_with_level_is_exact() {
        let batch = LogBatch::new(vec![
            LogRecord::new(at(1), "ERROR", "x"),
            LogRecord::new(at(2), "error", "y"),
            LogRecord::new(at(3), "ERROR", "z"),
        ]);
        let idx: Vec<usize> = batch.with_level(ERROR_LEVEL).map(|(i, _)| i).collect();
        assert_eq!(idx, vec![0, 2]);
    }

    #[test]
    fn test_batches_get_distinct_ids() {
        assert_ne!(LogBatch::empty().id(), LogBatch::empty().id());
    }
}
