//! Frame type with channel-order and mirror conversions, plus YUYV decode.

use image::RgbImage;

/// Order of the three color channels in a packed frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    /// Blue-green-red, the order most capture libraries hand out.
    Bgr,
}

/// A captured color camera frame (height × width × 3, byte-valued).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Packed pixel data, row-major, 3 bytes per pixel.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Build a frame from packed 3-channel data.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        let expected = pixel_bytes(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            order,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// True when the frame carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Flip the frame horizontally in place.
    pub fn mirror(&mut self) {
        mirror_rows(&mut self.data, self.width, self.height);
    }

    /// Return a copy of this frame in the requested channel order.
    pub fn to_order(&self, order: ChannelOrder) -> Frame {
        let mut out = self.clone();
        if out.order != order {
            swap_red_blue(&mut out.data);
            out.order = order;
        }
        out
    }

    /// Convert to an RGB image for display or encoding.
    ///
    /// Returns `None` for empty frames.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.is_empty() {
            return None;
        }
        let rgb = self.to_order(ChannelOrder::Rgb);
        RgbImage::from_raw(self.width, self.height, rgb.data)
    }
}

fn pixel_bytes(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Swap the first and third channel of every packed 3-byte pixel.
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Reverse the pixel order of every row of a packed 3-channel buffer.
pub fn mirror_rows(data: &mut [u8], width: u32, height: u32) {
    let w = width as usize;
    let row_bytes = w * 3;
    if row_bytes == 0 || data.len() < row_bytes * height as usize {
        return;
    }
    for row in data.chunks_exact_mut(row_bytes).take(height as usize) {
        for x in 0..w / 2 {
            let (left, right) = (x * 3, (w - 1 - x) * 3);
            for c in 0..3 {
                row.swap(left + c, right + c);
            }
        }
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U and V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(rgb)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_2x1() -> Frame {
        // left pixel (1,2,3), right pixel (4,5,6)
        Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, ChannelOrder::Bgr, 0).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = Frame::new(vec![0; 5], 2, 1, ChannelOrder::Rgb, 0);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_mirror_swaps_pixels_not_channels() {
        let mut frame = frame_2x1();
        frame.mirror();
        assert_eq!(frame.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_mirror_odd_width_keeps_center() {
        let mut data: Vec<u8> = (0..9).collect();
        mirror_rows(&mut data, 3, 1);
        assert_eq!(data, vec![6, 7, 8, 3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_mirror_multiple_rows() {
        let mut data = vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];
        mirror_rows(&mut data, 2, 2);
        assert_eq!(data, vec![2, 2, 2, 1, 1, 1, 4, 4, 4, 3, 3, 3]);
    }

    #[test]
    fn test_to_order_swaps_once() {
        let frame = frame_2x1();
        let rgb = frame.to_order(ChannelOrder::Rgb);
        assert_eq!(rgb.order, ChannelOrder::Rgb);
        assert_eq!(rgb.data, vec![3, 2, 1, 6, 5, 4]);

        // Already in the requested order: untouched
        let same = rgb.to_order(ChannelOrder::Rgb);
        assert_eq!(same.data, rgb.data);
    }

    #[test]
    fn test_to_rgb_image_from_bgr() {
        let image = frame_2x1().to_rgb_image().unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [3, 2, 1]);
    }

    #[test]
    fn test_to_rgb_image_empty_frame() {
        let frame = Frame::new(Vec::new(), 0, 0, ChannelOrder::Rgb, 0).unwrap();
        assert!(frame.is_empty());
        assert!(frame.to_rgb_image().is_none());
    }

    #[test]
    fn test_yuyv_to_rgb_gray_pixels() {
        // Neutral chroma: RGB equals luma
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_to_rgb_clamps() {
        // Strong red chroma saturates R, floors G
        let yuyv = vec![250, 128, 250, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 250);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }
}
