//! rollcall-hw: Webcam capture and frame handling.
//!
//! Provides the `Frame` type with its color-order and mirror conversions,
//! and a V4L2-backed `Camera` implementing `FrameSource`.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{ChannelOrder, Frame, FrameError};
pub use source::FrameSource;
