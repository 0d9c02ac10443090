//! Session controller: display tick, login flow, enrollment flow.
//!
//! Everything here runs on one thread. A login blocks the display tick
//! for the duration of the recognizer run.

use crate::ui::Ui;
use image::RgbImage;
use rollcall_core::recognizer::recognize;
use rollcall_core::{
    AttendanceLog, Gallery, GalleryEntry, GalleryError, MatchOutcome, ProbeImage, Recognizer,
};
use rollcall_hw::{Frame, FrameSource};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no image captured yet")]
    NoCapture,
    #[error("username cannot be empty")]
    EmptyName,
    #[error("enrollment view is not open")]
    EnrollmentNotOpen,
    #[error(transparent)]
    Gallery(GalleryError),
}

impl From<GalleryError> for SessionError {
    fn from(e: GalleryError) -> Self {
        match e {
            GalleryError::EmptyName => Self::EmptyName,
            other => Self::Gallery(other),
        }
    }
}

/// Owns the most recent frame and drives the login and enrollment flows.
pub struct Session<S, R, U> {
    source: S,
    recognizer: R,
    ui: U,
    gallery: Gallery,
    log: AttendanceLog,
    probe_path: PathBuf,
    latest: Option<Frame>,
    /// Still captured when the enrollment view opened.
    enrollment: Option<RgbImage>,
}

impl<S: FrameSource, R: Recognizer, U: Ui> Session<S, R, U> {
    pub fn new(
        source: S,
        recognizer: R,
        ui: U,
        gallery: Gallery,
        log: AttendanceLog,
        probe_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            recognizer,
            ui,
            gallery,
            log,
            probe_path: probe_path.into(),
            latest: None,
            enrollment: None,
        }
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Most recent frame, if any read has ever succeeded.
    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    pub fn has_capture(&self) -> bool {
        self.latest.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn enrollment_open(&self) -> bool {
        self.enrollment.is_some()
    }

    /// One display tick: pull a frame and push it to the video surface.
    ///
    /// Returns whether a new frame arrived. When none did (or the frame was
    /// empty), the previous frame stays current.
    pub fn tick(&mut self) -> bool {
        let Some(frame) = self.source.read_frame() else {
            tracing::trace!("no new frame");
            return false;
        };
        let Some(display) = frame.to_rgb_image() else {
            tracing::trace!(seq = frame.sequence, "ignoring empty frame");
            return false;
        };
        self.ui.show_frame(&display);
        self.latest = Some(frame);
        true
    }

    fn snapshot(&self) -> Result<RgbImage, SessionError> {
        self.latest
            .as_ref()
            .and_then(Frame::to_rgb_image)
            .ok_or(SessionError::NoCapture)
    }

    /// Run one login attempt against the gallery.
    ///
    /// Only `NoCapture` is returned as an error; every recognizer failure is
    /// reported to the user and comes back as `MatchOutcome::InvocationError`.
    /// The probe file never outlives this call.
    pub fn login(&mut self) -> Result<MatchOutcome, SessionError> {
        let still = match self.snapshot() {
            Ok(still) => still,
            Err(e) => {
                tracing::warn!("login requested before any frame was captured");
                self.ui
                    .show_message("Error", "No image captured. Please try again.");
                return Err(e);
            }
        };

        let (outcome, probe) = self.match_still(&still);
        self.report(&outcome);

        if let Some(identity) = outcome.identity() {
            if let Err(e) = self.log.record(identity) {
                tracing::error!(error = %e, identity = %identity, "failed to record attendance");
                self.ui
                    .show_message("Error", &format!("Could not record attendance: {e}"));
            }
        }

        // Cleanup: removes the probe file.
        drop(probe);
        Ok(outcome)
    }

    fn match_still(&self, still: &RgbImage) -> (MatchOutcome, Option<ProbeImage>) {
        let probe = match ProbeImage::create(&self.probe_path, still) {
            Ok(probe) => probe,
            Err(e) => return (MatchOutcome::InvocationError(e.to_string()), None),
        };

        let outcome = match (self.gallery.absolute_dir(), probe.absolute_path()) {
            (Ok(gallery_dir), Ok(probe_path)) => {
                recognize(&self.recognizer, &gallery_dir, &probe_path)
            }
            (Err(e), _) => MatchOutcome::InvocationError(e.to_string()),
            (_, Err(e)) => MatchOutcome::InvocationError(e.to_string()),
        };

        tracing::info!(outcome = %outcome, "login attempt finished");
        (outcome, Some(probe))
    }

    fn report(&mut self, outcome: &MatchOutcome) {
        match outcome {
            MatchOutcome::Recognized(name) => self
                .ui
                .show_message("Welcome Back", &format!("Welcome back, {name}.")),
            MatchOutcome::Unrecognized => self.ui.show_message(
                "Oops...",
                "Unknown user. Please register a new user or try again.",
            ),
            MatchOutcome::NoFaceDetected => self.ui.show_message(
                "Oops...",
                "No face recognized. Please register a new user or try again.",
            ),
            MatchOutcome::InvocationError(msg) => {
                tracing::error!(error = %msg, "error running face recognition");
                self.ui
                    .show_message("Error", &format!("Error running face recognition: {msg}"));
            }
        }
    }

    /// Open the enrollment view on a copy of the current frame.
    pub fn begin_enrollment(&mut self) -> Result<(), SessionError> {
        let still = match self.snapshot() {
            Ok(still) => still,
            Err(e) => {
                self.ui
                    .show_message("Error", "No image captured. Please try again.");
                return Err(e);
            }
        };
        self.ui.open_enrollment(&still);
        self.enrollment = Some(still);
        Ok(())
    }

    /// Store the enrollment still under the username currently entered.
    ///
    /// On failure the view stays open so the user can correct the name.
    pub fn accept_enrollment(&mut self) -> Result<GalleryEntry, SessionError> {
        let Some(still) = &self.enrollment else {
            return Err(SessionError::EnrollmentNotOpen);
        };

        let name = self.ui.username();
        match self.gallery.enroll(&name, still) {
            Ok(entry) => {
                self.enrollment = None;
                self.ui
                    .show_message("Success!", "User successfully registered!");
                self.ui.close_enrollment();
                Ok(entry)
            }
            Err(e) => {
                let err = SessionError::from(e);
                let body = match &err {
                    SessionError::EmptyName => "Username cannot be empty.".to_string(),
                    other => format!("Could not register user: {other}"),
                };
                tracing::warn!(error = %err, "enrollment rejected");
                self.ui.show_message("Error", &body);
                Err(err)
            }
        }
    }

    /// Discard the enrollment still and close the view.
    pub fn retry_enrollment(&mut self) {
        if self.enrollment.take().is_some() {
            self.ui.close_enrollment();
        }
    }
}
