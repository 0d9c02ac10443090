//! Append-only attendance log: one `<identity>,<timestamp>` line per match.
//!
//! Single writer: the log is opened, appended, and closed per record with
//! no locking.

use crate::types::AttendanceRecord;
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("attendance log {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
}

impl AttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record for `identity` at `timestamp`.
    pub fn append(
        &self,
        identity: &str,
        timestamp: DateTime<Local>,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let record = AttendanceRecord {
            identity: identity.to_string(),
            timestamp: timestamp.naive_local(),
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{record}").map_err(|e| self.io_error(e))?;

        tracing::info!(identity, path = %self.path.display(), "attendance recorded");
        Ok(record)
    }

    /// Append a record stamped with the current local time.
    pub fn record(&self, identity: &str) -> Result<AttendanceRecord, AttendanceError> {
        self.append(identity, Local::now())
    }

    /// All records in file order. A missing log reads as empty; malformed
    /// lines are skipped.
    pub fn read_all(&self) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match AttendanceRecord::parse_line(line) {
                Some(record) => records.push(record),
                None => tracing::warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    "skipping malformed attendance line"
                ),
            }
        }
        Ok(records)
    }

    fn io_error(&self, source: std::io::Error) -> AttendanceError {
        AttendanceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
