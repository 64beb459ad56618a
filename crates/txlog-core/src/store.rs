//! Record store - turns a raw table into a normalized LogBatch

use crate::timestamp::parse_timestamp;
use crate::{LogBatch, LogRecord};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

// required column absent, fatal to the load
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

// failures while reading the source file itself
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// Names of the three required columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            level: "level".to_string(),
            message: "message".to_string(),
        }
    }
}

/// Untyped tabular input as handed over by the loader: a header row and
/// string cells. Rows may be shorter or longer than the header.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    // read a CSV document with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }
}

/// Load with the default `timestamp`/`level`/`message` columns.
pub fn load(raw: &RawTable) -> Result<LogBatch, SchemaError> {
    load_with(raw, &ColumnMapping::default())
}

/// Build a batch from `raw`.
///
/// All required columns are resolved before any row is touched, so a missing
/// column never yields a partial batch. Rows whose timestamp does not parse are
/// dropped silently and only counted.
pub fn load_with(raw: &RawTable, columns: &ColumnMapping) -> Result<LogBatch, SchemaError> {
    let ts_col = raw.column(&columns.timestamp);
    let level_col = raw.column(&columns.level);
    let msg_col = raw.column(&columns.message);

    let (Some(ts_col), Some(level_col), Some(msg_col)) = (ts_col, level_col, msg_col) else {
        let missing = [
            (&columns.timestamp, ts_col),
            (&columns.level, level_col),
            (&columns.message, msg_col),
        ]
        .into_iter()
        .filter(|(_, col)| col.is_none())
        .map(|(name, _)| name.clone())
        .collect();
        return Err(SchemaError::MissingColumns(missing));
    };

    let mut records = Vec::with_capacity(raw.rows.len());
    let mut dropped = 0;

    for (line, row) in raw.rows.iter().enumerate() {
        match parse_timestamp(&cell(row, ts_col)) {
            Ok(timestamp) => records.push(LogRecord {
                timestamp,
                level: cell(row, level_col).trim().to_string(),
                message: cell(row, msg_col),
            }),
            Err(e) => {
                dropped += 1;
                debug!(row = line, error = %e, "Dropping row");
            }
        }
    }

    info!(loaded = records.len(), dropped, "Log batch loaded");
    Ok(LogBatch::with_dropped(records, dropped))
}

// short rows read missing cells as empty
fn cell(row: &[String], col: usize) -> String {
    row.get(col).cloned().unwrap_or_default()
}
