//! UI collaborator seam and its terminal implementation.

use image::{ImageFormat, RgbImage};
use std::io::{self, Write};
use std::path::PathBuf;

/// Write the preview every this many display frames (~0.5 s at 20 ms ticks).
const PREVIEW_EVERY: u64 = 25;

/// What the session needs from a user interface.
pub trait Ui {
    /// Push a display-ready frame to the live video surface.
    fn show_frame(&mut self, frame: &RgbImage);
    /// Show a modal message and return once it is dismissed.
    fn show_message(&mut self, title: &str, body: &str);
    /// Open the enrollment view showing `still`.
    fn open_enrollment(&mut self, still: &RgbImage);
    /// Current contents of the username field.
    fn username(&self) -> String;
    fn close_enrollment(&mut self);
}

/// Line-oriented terminal UI.
///
/// The video surface is optional: with a preview path configured, the
/// latest frame (or the enrollment still) is written there as JPEG.
pub struct TerminalUi<W: Write = io::Stdout> {
    out: W,
    preview_path: Option<PathBuf>,
    frames: u64,
    username: String,
    enrolling: bool,
}

impl TerminalUi<io::Stdout> {
    pub fn stdout(preview_path: Option<PathBuf>) -> Self {
        Self::new(io::stdout(), preview_path)
    }
}

impl<W: Write> TerminalUi<W> {
    pub fn new(out: W, preview_path: Option<PathBuf>) -> Self {
        Self {
            out,
            preview_path,
            frames: 0,
            username: String::new(),
            enrolling: false,
        }
    }

    /// Set the username field, as typed by the user.
    pub fn set_username(&mut self, name: &str) {
        self.username = name.to_string();
    }

    /// Number of frames pushed to the video surface so far.
    pub fn frames_shown(&self) -> u64 {
        self.frames
    }

    /// Print a line (prompts, listings).
    pub fn say(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write to terminal");
        }
    }

    fn write_preview(&self, image: &RgbImage) {
        let Some(path) = &self.preview_path else {
            return;
        };
        if let Err(e) = image.save_with_format(path, ImageFormat::Jpeg) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write preview");
        }
    }
}

impl<W: Write> Ui for TerminalUi<W> {
    fn show_frame(&mut self, frame: &RgbImage) {
        self.frames += 1;
        if self.frames == 1 {
            tracing::info!(width = frame.width(), height = frame.height(), "first frame displayed");
        }
        // The enrollment still stays on the preview while the view is open.
        if !self.enrolling && self.frames % PREVIEW_EVERY == 1 {
            self.write_preview(frame);
        }
    }

    fn show_message(&mut self, title: &str, body: &str) {
        self.say(&format!("[{title}] {body}"));
    }

    fn open_enrollment(&mut self, still: &RgbImage) {
        self.enrolling = true;
        self.username.clear();
        self.write_preview(still);
        self.say("Please enter the username (:retry takes another picture, :quit exits):");
    }

    fn username(&self) -> String {
        self.username.clone()
    }

    fn close_enrollment(&mut self) {
        self.enrolling = false;
        self.username.clear();
    }
}
