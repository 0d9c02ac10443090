use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{AttendanceLog, FaceRecognitionCli, Gallery};
use rollcall_hw::{Camera, FrameSource};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod interactive;
mod session;
mod ui;

use config::Config;
use session::Session;
use ui::TerminalUi;

/// How long one-shot commands wait for the camera's first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "rollcall", about = "Webcam face login and attendance")]
struct Cli {
    /// Camera device index (/dev/video<N>)
    #[arg(long, global = true)]
    camera: Option<u32>,
    /// Gallery directory of enrolled faces
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,
    /// Attendance log file
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Recognizer executable
    #[arg(long, global = true)]
    recognizer: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session: live capture with login and register commands
    Run,
    /// Capture one frame and log in with it
    Login,
    /// Capture one frame and enroll it under a username
    Enroll {
        /// Username to register
        #[arg(short, long)]
        name: String,
    },
    /// List enrolled identities
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the attendance log
    Log {
        #[arg(long)]
        json: bool,
    },
    /// Run camera diagnostics
    Test,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(camera) = cli.camera {
        config.camera_index = camera;
    }
    if let Some(gallery) = cli.gallery {
        config.gallery_dir = gallery;
    }
    if let Some(log) = cli.log {
        config.log_path = log;
    }
    if let Some(recognizer) = cli.recognizer {
        config.recognizer = recognizer;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut session = open_session(&config)?;
            interactive::run(&mut session, config.tick()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Login => {
            let mut session = open_session(&config)?;
            wait_for_frame(&mut session, config.tick())?;
            let recognized = session.login().is_ok_and(|outcome| outcome.is_recognized());
            Ok(if recognized {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Enroll { name } => {
            let mut session = open_session(&config)?;
            wait_for_frame(&mut session, config.tick())?;
            if session.gallery().contains(&name) {
                tracing::info!(name = %name.trim(), "replacing existing gallery entry");
            }
            session.begin_enrollment()?;
            session.ui_mut().set_username(&name);
            let entry = session.accept_enrollment()?;
            tracing::info!(name = %entry.name, path = %entry.path.display(), "enrolled");
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { json } => {
            let gallery = Gallery::open(&config.gallery_dir)?;
            let entries = gallery.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No users enrolled");
            } else {
                for entry in entries {
                    println!("{}\t{}", entry.name, entry.path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Log { json } => {
            let records = AttendanceLog::new(&config.log_path).read_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    println!("{record}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Test => camera_diagnostics(&config),
    }
}

type CliSession = Session<Camera, FaceRecognitionCli, TerminalUi>;

/// Open the camera and the gallery. A camera failure here is fatal.
fn open_session(config: &Config) -> Result<CliSession> {
    let camera = Camera::open(config.camera_index)
        .with_context(|| format!("failed to open camera {}", config.camera_index))?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        format = ?camera.pixel_format(),
        "camera opened"
    );

    let gallery = Gallery::open(&config.gallery_dir)?;
    let recognizer = FaceRecognitionCli::new(&config.recognizer).with_tolerance(config.tolerance);
    tracing::debug!(program = %recognizer.program().display(), "recognizer configured");

    Ok(Session::new(
        camera,
        recognizer,
        TerminalUi::stdout(config.preview_path.clone()),
        gallery,
        AttendanceLog::new(&config.log_path),
        &config.probe_path,
    ))
}

/// Tick until the first frame arrives, for one-shot commands.
fn wait_for_frame(session: &mut CliSession, tick: Duration) -> Result<()> {
    let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;
    while !session.has_capture() {
        if Instant::now() >= deadline {
            anyhow::bail!("no frame from camera within {FIRST_FRAME_TIMEOUT:?}");
        }
        if !session.tick() {
            std::thread::sleep(tick);
        }
    }
    Ok(())
}

fn camera_diagnostics(config: &Config) -> Result<ExitCode> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for dev in &devices {
        println!("{}\t{}\t{} ({})", dev.index, dev.path, dev.name, dev.driver);
    }

    let mut camera = match Camera::open(config.camera_index) {
        Ok(camera) => camera,
        Err(e) => {
            println!("camera {}: {e}", config.camera_index);
            return Ok(ExitCode::FAILURE);
        }
    };
    let start = Instant::now();
    while start.elapsed() < FIRST_FRAME_TIMEOUT {
        if let Some(frame) = camera.read_frame() {
            println!(
                "camera {}: {}x{} {:?} frame in {:?}",
                config.camera_index,
                frame.width,
                frame.height,
                camera.pixel_format(),
                start.elapsed()
            );
            return Ok(ExitCode::SUCCESS);
        }
        if !camera.is_streaming() {
            println!("camera {}: capture stopped before the first frame", config.camera_index);
            return Ok(ExitCode::FAILURE);
        }
        std::thread::sleep(config.tick());
    }
    println!("camera {}: no frame within {FIRST_FRAME_TIMEOUT:?}", config.camera_index);
    Ok(ExitCode::FAILURE)
}
