use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Timestamp layout used in attendance lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Outcome of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// The probe matched an enrolled identity.
    Recognized(String),
    /// A face was found but matched nobody in the gallery.
    Unrecognized,
    /// The recognizer produced no output at all.
    NoFaceDetected,
    /// The recognizer failed or produced output we could not interpret.
    InvocationError(String),
}

impl MatchOutcome {
    /// Matched identity, if any.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Recognized(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized(_))
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recognized(name) => write!(f, "recognized {name}"),
            Self::Unrecognized => f.write_str("unrecognized"),
            Self::NoFaceDetected => f.write_str("no face detected"),
            Self::InvocationError(msg) => write!(f, "invocation error: {msg}"),
        }
    }
}

/// An enrolled identity and its reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryEntry {
    pub name: String,
    pub path: PathBuf,
}

/// One line of the attendance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub identity: String,
    /// Local wall-clock time of the match.
    pub timestamp: NaiveDateTime,
}

impl AttendanceRecord {
    /// Parse `<identity>,<timestamp>`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (identity, timestamp) = line.trim_end().split_once(',')?;
        if identity.is_empty() {
            return None;
        }
        let timestamp =
            NaiveDateTime::parse_from_str(timestamp.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
        Some(Self {
            identity: identity.to_string(),
            timestamp,
        })
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.identity,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}
