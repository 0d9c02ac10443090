//! V4L2 webcam capture via the `v4l` crate.
//!
//! A capture thread owns the device and publishes only the most recent
//! decoded frame through a `watch` channel, so polling never blocks.

use crate::frame::{self, ChannelOrder, Frame};
use crate::source::FrameSource;
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const MAX_DEVICE_INDEX: u32 = 16;
/// How long drop waits for the capture thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, decoded to RGB).
    Yuyv,
    /// Motion JPEG (one JPEG per buffer).
    Mjpeg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"MJPG") {
            Some(Self::Mjpeg)
        } else {
            None
        }
    }
}

/// V4L2 webcam handle.
pub struct Camera {
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    rx: Option<watch::Receiver<Option<Frame>>>,
    thread: Option<JoinHandle<()>>,
}

impl Camera {
    /// Open `/dev/video<index>` and start streaming.
    pub fn open(device_index: u32) -> Result<Self, CameraError> {
        let device_path = format!("/dev/video{device_index}");
        if !Path::new(&device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Prefer YUYV; fall back to MJPEG, which most USB webcams also offer.
        let mut negotiated = None;
        for fourcc in [FourCC::new(b"YUYV"), FourCC::new(b"MJPG")] {
            let mut fmt = device.format().map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
            })?;
            fmt.fourcc = fourcc;
            fmt.width = CAPTURE_WIDTH;
            fmt.height = CAPTURE_HEIGHT;

            let set = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if let Some(pixel_format) = PixelFormat::from_fourcc(set.fourcc) {
                negotiated = Some((set, pixel_format));
                break;
            }
        }

        let Some((fmt, pixel_format)) = negotiated else {
            return Err(CameraError::FormatNegotiationFailed(
                "device offers neither YUYV nor MJPG".into(),
            ));
        };

        tracing::info!(
            width = fmt.width,
            height = fmt.height,
            fourcc = ?fmt.fourcc,
            "negotiated format"
        );

        let (tx, rx) = watch::channel(None);
        let (width, height) = (fmt.width, fmt.height);
        let thread = std::thread::Builder::new()
            .name("rollcall-capture".into())
            .spawn(move || capture_loop(device, pixel_format, width, height, tx))
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        Ok(Self {
            width,
            height,
            device_path,
            fourcc: fmt.fourcc,
            pixel_format,
            rx: Some(rx),
            thread: Some(thread),
        })
    }

    /// Negotiated pixel format.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Whether the capture thread is still delivering frames.
    pub fn is_streaming(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for index in 0..MAX_DEVICE_INDEX {
            let path = format!("/dev/video{index}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                index,
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    fn read_frame(&mut self) -> Option<Frame> {
        let rx = self.rx.as_mut()?;
        match rx.has_changed() {
            Ok(true) => rx.borrow_and_update().clone(),
            Ok(false) => None,
            Err(_) => {
                tracing::trace!(device = %self.device_path, "capture thread stopped");
                None
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        // Dropping the receiver makes the next publish fail, ending the thread.
        drop(self.rx.take());
        if let Some(thread) = self.thread.take() {
            if !join_within(thread, JOIN_TIMEOUT) {
                tracing::warn!(
                    device = %self.device_path,
                    "capture thread still waiting on the device; detaching it"
                );
            }
        }
    }
}

/// Join `thread` if it finishes within `timeout`. Returns false (leaving the
/// thread detached) if it is still running at the deadline.
fn join_within(thread: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let _ = thread.join();
    true
}

fn capture_loop(
    device: Device,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    tx: watch::Sender<Option<Frame>>,
) {
    let mut stream = match MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to create mmap stream");
            return;
        }
    };

    tracing::debug!("capture thread started");
    loop {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(error = %e, "failed to dequeue buffer; stopping capture");
                break;
            }
        };

        let mut frame = match decode(buf, pixel_format, width, height, meta.sequence) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(seq = meta.sequence, error = %e, "dropping undecodable frame");
                continue;
            }
        };
        frame.mirror();

        if tx.send(Some(frame)).is_err() {
            break;
        }
    }
    tracing::debug!("capture thread exiting");
}

/// Decode a raw capture buffer into an RGB frame.
fn decode(
    buf: &[u8],
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u32,
) -> Result<Frame, frame::FrameError> {
    match pixel_format {
        PixelFormat::Yuyv => {
            let rgb = frame::yuyv_to_rgb(buf, width, height)?;
            Frame::new(rgb, width, height, ChannelOrder::Rgb, sequence)
        }
        PixelFormat::Mjpeg => {
            let image = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_rgb8();
            let (w, h) = image.dimensions();
            Frame::new(image.into_raw(), w, h, ChannelOrder::Rgb, sequence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open(MAX_DEVICE_INDEX + 83);
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_decode_yuyv() {
        let frame = decode(&[100, 128, 200, 128], PixelFormat::Yuyv, 2, 1, 3).unwrap();
        assert_eq!(frame.order, ChannelOrder::Rgb);
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.data.len(), 6);
    }

    #[test]
    fn test_decode_mjpeg() {
        let mut jpeg = Vec::new();
        let img = image::RgbImage::from_fn(16, 8, |x, y| image::Rgb([x as u8, y as u8, 50]));
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .write_image(img.as_raw(), 16, 8, image::ExtendedColorType::Rgb8)
            .unwrap();

        let frame = decode(&jpeg, PixelFormat::Mjpeg, 640, 480, 0).unwrap();
        assert_eq!((frame.width, frame.height), (16, 8));
        assert_eq!(frame.data.len(), 16 * 8 * 3);
    }

    #[test]
    fn test_join_within_finished_thread() {
        let thread = std::thread::spawn(|| {});
        assert!(join_within(thread, Duration::from_secs(5)));
    }

    #[test]
    fn test_join_within_gives_up_on_stuck_thread() {
        let thread = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(3)));
        let start = Instant::now();
        assert!(!join_within(thread, Duration::from_millis(50)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_decode_mjpeg_garbage() {
        assert!(decode(&[0, 1, 2, 3], PixelFormat::Mjpeg, 2, 2, 0).is_err());
    }
}
