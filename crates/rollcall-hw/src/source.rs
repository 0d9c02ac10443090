use crate::frame::Frame;

/// A producer of camera frames, polled once per display tick.
///
/// Implementations must not block: `read_frame` returns the newest frame
/// produced since the previous call, or `None` when nothing new is
/// available. Frames come back mirrored horizontally.
pub trait FrameSource {
    fn read_frame(&mut self) -> Option<Frame>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read_frame(&mut self) -> Option<Frame> {
        (**self).read_frame()
    }
}
