//! Frame buffers flowing through the redaction pipeline.
//!
//! - `Frame`: owned RGB8 pixel buffer (height x width x 3). Zeroized on drop.
//! - `InferenceView`: read-only view handed to detector backends.
//! - `PixelRect`: integer rectangle in frame pixel space.
//!
//! Ownership: `Pipeline::process` takes a `Frame` by value and composites into
//! that same buffer. Frames that may still hold unredacted content are never
//! serialized and their `Debug` output carries dimensions only.

use std::fmt;

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{RedactError, Result};

/// Bytes per pixel (RGB8).
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Owned RGB8 frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Black frame of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            image: RgbImage::new(width, height),
        })
    }

    /// Wrap interleaved RGB bytes. The length must be exactly `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        check_dimensions(width, height)?;
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| RedactError::InvalidFrame("frame dimensions overflow".into()))?;
        if data.len() != expected {
            return Err(RedactError::InvalidFrame(format!(
                "expected {} RGB bytes for {}x{}, received {} (wrong channel count?)",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let image = ImageBuffer::from_raw(width, height, data)
            .ok_or_else(|| RedactError::InvalidFrame("pixel buffer rejected".into()))?;
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Result<Self> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self { image })
    }

    /// Decode-side helper: any decoded image is converted to RGB8.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        Self::from_image(image.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.image.put_pixel(x, y, Rgb(rgb));
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Hand the pixels to an outbound sink (encoder, writer).
    pub fn into_image(mut self) -> RgbImage {
        std::mem::take(&mut self.image)
    }

    /// Restricted view for detector backends.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }

    /// Hex SHA-256 over dimensions and pixels.
    ///
    /// Suitable as a caller-chosen `frame_id` when upstream may re-send the
    /// same frame.
    pub fn content_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_le_bytes());
        hasher.update(self.height().to_le_bytes());
        hasher.update(self.image.as_raw());
        hex::encode(hasher.finalize())
    }

    /// Full-frame rectangle.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width(), self.height())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Frames may carry unredacted content; clear pixels before release.
        let pixels: &mut [u8] = &mut self.image;
        pixels.zeroize();
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RedactError::InvalidFrame(format!(
            "zero-sized frame {}x{}",
            width, height
        )));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// InferenceView
// ----------------------------------------------------------------------------

/// Read-only view of a frame for inference.
///
/// Backends receive pixels through this view for the duration of a single
/// `detect` call and must not retain them.
pub struct InferenceView<'a> {
    frame: &'a Frame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    /// Interleaved RGB bytes, row-major.
    pub fn pixels(&self) -> &'a [u8] {
        self.frame.image.as_raw()
    }

    pub fn image(&self) -> &'a RgbImage {
        &self.frame.image
    }
}

// ----------------------------------------------------------------------------
// PixelRect
// ----------------------------------------------------------------------------

/// Half-open integer rectangle `[x1, x2) x [y1, y2)` in frame pixels.
///
/// Invariant: `x1 <= x2` and `y1 <= y2`. A zero-area rectangle is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x1,
            y1,
            x2: x2.max(x1),
            y2: y2.max(y1),
        }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// Grow by `padding` on every side, clamped to a `width` x `height` frame.
    pub fn expand(&self, padding: u32, width: u32, height: u32) -> Self {
        Self::new(
            self.x1.saturating_sub(padding),
            self.y1.saturating_sub(padding),
            self.x2.saturating_add(padding).min(width),
            self.y2.saturating_add(padding).min(height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(2, 2, vec![0u8; 12]).is_ok());

        let err = Frame::from_rgb(2, 2, vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, RedactError::InvalidFrame(_)));
    }

    #[test]
    fn zero_sized_frames_are_rejected() {
        assert!(matches!(
            Frame::new(0, 10),
            Err(RedactError::InvalidFrame(_))
        ));
        assert!(matches!(
            Frame::from_rgb(10, 0, Vec::new()),
            Err(RedactError::InvalidFrame(_))
        ));
    }

    #[test]
    fn content_id_tracks_pixels_and_shape() {
        let a = Frame::from_rgb(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let b = Frame::from_rgb(1, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut c = a.clone();

        assert_eq!(a.content_id(), a.clone().content_id());
        assert_ne!(a.content_id(), b.content_id());

        c.put_pixel(0, 0, [9, 9, 9]);
        assert_ne!(a.content_id(), c.content_id());
    }

    #[test]
    fn debug_output_omits_pixels() {
        let frame = Frame::from_rgb(1, 1, vec![42, 43, 44]).unwrap();
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("width: 1"));
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn expand_clamps_to_frame() {
        let rect = PixelRect::new(2, 3, 8, 9);
        let padded = rect.expand(5, 10, 10);
        assert_eq!(padded, PixelRect::new(0, 0, 10, 10));

        let inner = PixelRect::new(4, 4, 6, 6).expand(1, 10, 10);
        assert_eq!(inner, PixelRect::new(3, 3, 7, 7));
    }

    #[test]
    fn into_image_hands_over_pixels() {
        let frame = Frame::from_rgb(1, 1, vec![7, 8, 9]).unwrap();
        let image = frame.into_image();
        assert_eq!(image.as_raw(), &vec![7, 8, 9]);
    }
}
