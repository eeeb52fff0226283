//! Decoded video frames handed to detectors.

use image::{DynamicImage, ImageBuffer, Rgb};

use crate::error::{MediaError, MediaResult};

/// A decoded RGB24 frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB24 pixels, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Presentation time relative to the start of the source, in seconds
    pub pts_secs: f64,
}

impl Frame {
    /// Create a frame, checking the pixel buffer matches the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>, pts_secs: f64) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(MediaError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data,
            pts_secs,
        })
    }

    /// Size of one RGB24 frame with the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Copy the pixels into an `image` buffer.
    pub fn to_image(&self) -> MediaResult<DynamicImage> {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| MediaError::internal("Failed to create image buffer"))?;
        Ok(DynamicImage::ImageRgb8(buffer))
    }
}

/// Divide `width`/`height` by `factor`, rounding down to even values so the
/// result stays valid for chroma-subsampled pixel formats.
pub fn scaled_dimensions(width: u32, height: u32, factor: u32) -> (u32, u32) {
    let factor = factor.max(1);
    let even = |v: u32| ((v / factor) & !1).max(2);
    (even(width), even(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_check() {
        assert!(Frame::new(4, 2, vec![0; 24], 0.0).is_ok());
        assert!(matches!(
            Frame::new(4, 2, vec![0; 23], 0.0),
            Err(MediaError::InvalidFrame(_))
        ));
        assert!(Frame::new(0, 2, vec![], 0.0).is_err());
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(1920, 1080, 1), (1920, 1080));
        assert_eq!(scaled_dimensions(1920, 1080, 2), (960, 540));
        assert_eq!(scaled_dimensions(1918, 1078, 4), (478, 268));
        assert_eq!(scaled_dimensions(641, 481, 1), (640, 480));
        assert_eq!(scaled_dimensions(3, 3, 4), (2, 2));
        assert_eq!(scaled_dimensions(640, 480, 0), (640, 480));
    }

    #[test]
    fn test_to_image() {
        let frame = Frame::new(2, 1, vec![255, 0, 0, 0, 255, 0], 1.5).unwrap();
        let image = frame.to_image().unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 255, 0]);
    }
}
