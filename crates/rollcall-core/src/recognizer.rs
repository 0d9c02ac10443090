//! External face recognizer invocation and output parsing.
//!
//! The recognizer is the `face_recognition` command-line tool (or anything
//! with the same contract): `<tool> <galleryDir> <probePath>` prints
//! `<probePath>,<identity>` per face found, nothing when no face is found,
//! and exits non-zero on failure.

use crate::types::MatchOutcome;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub const DEFAULT_PROGRAM: &str = "face_recognition";

/// Tokens the tool prints instead of an identity when nobody matched.
pub const SENTINEL_IDENTITIES: [&str; 2] = ["unknown_person", "no_persons_found"];

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Raw result of one recognizer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Process exit code; `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: String,
}

impl Invocation {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the external matcher against the gallery. One attempt, no retry.
pub trait Recognizer {
    fn invoke(&self, gallery_dir: &Path, probe: &Path) -> Result<Invocation, RecognizerError>;
}

/// `face_recognition` CLI invoker.
#[derive(Debug, Clone)]
pub struct FaceRecognitionCli {
    program: PathBuf,
    tolerance: Option<f32>,
}

impl Default for FaceRecognitionCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl FaceRecognitionCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tolerance: None,
        }
    }

    /// Pass `--tolerance` to the tool (lower is stricter; the tool defaults to 0.6).
    pub fn with_tolerance(mut self, tolerance: Option<f32>) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, gallery_dir: &Path, probe: &Path) -> Vec<OsString> {
        let mut args = Vec::with_capacity(4);
        if let Some(tolerance) = self.tolerance {
            args.push("--tolerance".into());
            args.push(tolerance.to_string().into());
        }
        args.push(gallery_dir.into());
        args.push(probe.into());
        args
    }
}

impl Recognizer for FaceRecognitionCli {
    fn invoke(&self, gallery_dir: &Path, probe: &Path) -> Result<Invocation, RecognizerError> {
        let args = self.args(gallery_dir, probe);
        tracing::debug!(program = %self.program.display(), ?args, "invoking recognizer");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| RecognizerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        tracing::debug!(
            exit_code = ?output.status.code(),
            output = %combined.trim_end(),
            "recognizer finished"
        );

        Ok(Invocation {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// Turn one recognizer run into a match outcome.
pub fn parse_invocation(invocation: &Invocation) -> MatchOutcome {
    if !invocation.success() {
        let message = invocation.output.trim();
        return MatchOutcome::InvocationError(match (invocation.exit_code, message.is_empty()) {
            (Some(code), true) => format!("recognizer exited with status {code}"),
            (None, true) => "recognizer terminated by signal".to_string(),
            (_, false) => message.to_string(),
        });
    }
    parse_output(&invocation.output)
}

/// Parse the text a successful recognizer run printed.
///
/// Only the first `<probe>,<identity>` line counts; extra fields such as a
/// distance column are ignored.
pub fn parse_output(output: &str) -> MatchOutcome {
    if output.trim().is_empty() {
        return MatchOutcome::NoFaceDetected;
    }

    let Some(token) = output
        .lines()
        .find_map(|line| line.split(',').nth(1))
    else {
        return MatchOutcome::InvocationError(format!(
            "unexpected recognizer output: {}",
            output.trim()
        ));
    };

    let token = token.trim();
    let identity = token.strip_suffix(".jpg").unwrap_or(token).trim();

    if identity.is_empty() {
        MatchOutcome::InvocationError(format!(
            "recognizer reported an empty identity: {}",
            output.trim()
        ))
    } else if SENTINEL_IDENTITIES.contains(&identity) {
        MatchOutcome::Unrecognized
    } else {
        MatchOutcome::Recognized(identity.to_string())
    }
}

/// Invoke the recognizer and parse its result. Never fails: every error
/// becomes `MatchOutcome::InvocationError`.
pub fn recognize(
    recognizer: &(impl Recognizer + ?Sized),
    gallery_dir: &Path,
    probe: &Path,
) -> MatchOutcome {
    match recognizer.invoke(gallery_dir, probe) {
        Ok(invocation) => parse_invocation(&invocation),
        Err(e) => MatchOutcome::InvocationError(e.to_string()),
    }
}
