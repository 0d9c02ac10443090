//! Interactive session loop: a display tick on a timer plus stdin commands.
//!
//! Runs on a single-threaded runtime; handlers execute inline, so a login
//! pauses the display tick until the recognizer returns.

use crate::session::Session;
use crate::ui::TerminalUi;
use rollcall_core::Recognizer;
use rollcall_hw::FrameSource;
use std::io::Write;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

const HELP: &str = "commands: login | register | status | quit";
const ENROLL_HELP: &str = "enrollment: <username> | :retry | :quit";
const RETRY: &str = ":retry";
const QUIT: &str = ":quit";

/// One line of user input, interpreted for the current view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Login,
    Register,
    Quit,
    Help,
    Status,
    /// Username typed into the enrollment view.
    Name(String),
    /// Discard the enrollment still.
    Retry,
    Unknown(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str, enrolling: bool) -> Self {
        let trimmed = line.trim();
        if enrolling {
            // Usernames never start with ':', so that prefix is kept for commands.
            return match trimmed {
                RETRY => Self::Retry,
                QUIT => Self::Quit,
                cmd if cmd.starts_with(':') => Self::Unknown(cmd.to_string()),
                _ => Self::Name(line.trim_end_matches(['\r', '\n']).to_string()),
            };
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "login" | "l" => Self::Login,
            "register" | "r" => Self::Register,
            "quit" | "q" | "exit" => Self::Quit,
            "help" | "?" => Self::Help,
            "status" | "s" => Self::Status,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

/// Apply one input to the session. Flow errors are already reported to the
/// user by the session, so they only need logging here.
pub fn handle_input<S, R, W>(
    session: &mut Session<S, R, TerminalUi<W>>,
    input: Input,
) -> ControlFlow<()>
where
    S: FrameSource,
    R: Recognizer,
    W: Write,
{
    match input {
        Input::Quit => return ControlFlow::Break(()),
        Input::Login => {
            if let Err(e) = session.login() {
                tracing::debug!(error = %e, "login aborted");
            }
        }
        Input::Register => {
            if let Err(e) = session.begin_enrollment() {
                tracing::debug!(error = %e, "enrollment not started");
            }
        }
        Input::Name(name) => {
            session.ui_mut().set_username(&name);
            if let Err(e) = session.accept_enrollment() {
                tracing::debug!(error = %e, "enrollment not accepted");
            }
        }
        Input::Retry => session.retry_enrollment(),
        Input::Help => session.ui_mut().say(HELP),
        Input::Status => {
            let status = status_line(session);
            session.ui_mut().say(&status);
        }
        Input::Unknown(cmd) => {
            let help = if cmd.starts_with(':') { ENROLL_HELP } else { HELP };
            session
                .ui_mut()
                .say(&format!("unknown command {cmd:?}; {help}"));
        }
        Input::Empty => {}
    }
    ControlFlow::Continue(())
}

fn status_line<S, R, W: Write>(session: &Session<S, R, TerminalUi<W>>) -> String
where
    S: FrameSource,
    R: Recognizer,
{
    let frame = match session.latest_frame() {
        Some(frame) => format!("{}x{} (seq {})", frame.width, frame.height, frame.sequence),
        None => "none".to_string(),
    };
    let enrolled = match session.gallery().list() {
        Ok(entries) => entries.len().to_string(),
        Err(e) => format!("unavailable ({e})"),
    };
    format!(
        "frames shown: {} | latest frame: {frame} | gallery: {} | enrolled: {enrolled}",
        session.ui().frames_shown(),
        session.gallery().dir().display(),
    )
}

/// Run until `quit`, end of input, or Ctrl-C.
pub async fn run<S, R>(
    session: &mut Session<S, R, TerminalUi>,
    tick: Duration,
) -> anyhow::Result<()>
where
    S: FrameSource,
    R: Recognizer,
{
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    session.ui_mut().say(HELP);
    tracing::info!(tick_ms = tick.as_millis() as u64, "session started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("end of input");
                    break;
                };
                let input = Input::parse(&line, session.enrollment_open());
                if handle_input(session, input).is_break() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    tracing::info!("session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{AttendanceLog, Gallery, Invocation, RecognizerError};
    use rollcall_hw::{ChannelOrder, Frame};
    use std::path::Path;
    use tempfile::TempDir;

    struct OneFrame(Option<Frame>);

    impl FrameSource for OneFrame {
        fn read_frame(&mut self) -> Option<Frame> {
            self.0.take()
        }
    }

    struct NeverCalled;

    impl Recognizer for NeverCalled {
        fn invoke(&self, _: &Path, _: &Path) -> Result<Invocation, RecognizerError> {
            panic!("recognizer should not run");
        }
    }

    fn session(tmp: &TempDir) -> Session<OneFrame, NeverCalled, TerminalUi<Vec<u8>>> {
        let frame = Frame::new(vec![50; 4 * 4 * 3], 4, 4, ChannelOrder::Rgb, 0).unwrap();
        Session::new(
            OneFrame(Some(frame)),
            NeverCalled,
            TerminalUi::new(Vec::new(), None),
            Gallery::open(tmp.path().join("db")).unwrap(),
            AttendanceLog::new(tmp.path().join("log.txt")),
            tmp.path().join(".tmp.jpg"),
        )
    }

    #[test]
    fn test_register_then_name_enrolls() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp);
        session.tick();

        assert!(handle_input(&mut session, Input::Register).is_continue());
        assert!(session.enrollment_open());
        assert!(handle_input(&mut session, Input::Name("  ".into())).is_continue());
        assert!(session.enrollment_open());
        assert!(handle_input(&mut session, Input::Name("dana".into())).is_continue());
        assert!(!session.enrollment_open());
        assert!(tmp.path().join("db/dana.jpg").is_file());
    }

    #[test]
    fn test_retry_and_quit() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp);
        session.tick();

        handle_input(&mut session, Input::Register);
        handle_input(&mut session, Input::Retry);
        assert!(!session.enrollment_open());
        assert!(handle_input(&mut session, Input::Quit).is_break());
    }

    #[test]
    fn test_quit_word_in_enrollment_view() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp);
        session.tick();

        handle_input(&mut session, Input::Register);
        let unknown = Input::parse(":exit", true);
        assert!(handle_input(&mut session, unknown).is_continue());
        assert!(session.enrollment_open());
        assert!(handle_input(&mut session, Input::parse(":quit", true)).is_break());
        assert!(!tmp.path().join("db/:exit.jpg").exists());
        assert!(!tmp.path().join("db/:quit.jpg").exists());
    }

    #[test]
    fn test_status_line() {
        let tmp = TempDir::new().unwrap();
        let mut session = session(&tmp);
        assert!(status_line(&session).contains("latest frame: none"));
        session.tick();
        let status = status_line(&session);
        assert!(status.contains("frames shown: 1"));
        assert!(status.contains("4x4"));
        assert!(status.contains("enrolled: 0"));
    }

    #[test]
    fn test_parse_main_view_commands() {
        assert_eq!(Input::parse("login\n", false), Input::Login);
        assert_eq!(Input::parse("  Register ", false), Input::Register);
        assert_eq!(Input::parse("q", false), Input::Quit);
        assert_eq!(Input::parse("?", false), Input::Help);
        assert_eq!(Input::parse("status", false), Input::Status);
        assert_eq!(Input::parse("   ", false), Input::Empty);
        assert_eq!(Input::parse("dance", false), Input::Unknown("dance".into()));
    }

    #[test]
    fn test_parse_enrollment_view() {
        assert_eq!(Input::parse(":retry", true), Input::Retry);
        assert_eq!(Input::parse(" :quit ", true), Input::Quit);
        assert_eq!(Input::parse("login", true), Input::Name("login".into()));
        assert_eq!(Input::parse("quit", true), Input::Name("quit".into()));
        assert_eq!(Input::parse(":q", true), Input::Unknown(":q".into()));
        // Blank names pass through so the session can reject them.
        assert_eq!(Input::parse("  ", true), Input::Name("  ".into()));
    }
}
