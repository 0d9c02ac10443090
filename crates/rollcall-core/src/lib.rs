//! rollcall-core: Face gallery, recognizer invocation, and attendance.
//!
//! Matching itself is delegated to an external `face_recognition`-style
//! tool. This crate owns the files around that call and interprets what the
//! tool prints.

pub mod attendance;
pub mod gallery;
pub mod probe;
pub mod recognizer;
pub mod types;

pub use attendance::{AttendanceError, AttendanceLog};
pub use gallery::{Gallery, GalleryError};
pub use probe::{ProbeError, ProbeImage};
pub use recognizer::{FaceRecognitionCli, Invocation, Recognizer, RecognizerError};
pub use types::{AttendanceRecord, GalleryEntry, MatchOutcome};
