//! Detector space <-> original frame space.
//!
//! The orchestrator may shrink a working copy before detection. `downscale`
//! produces that copy; `rectify` maps boxes found on it back to original-frame
//! pixels. Both sides use the same `inference_scale` value, and this is the
//! only place where it is inverted.
//!
//! After `rectify`, every box satisfies `0 <= x1 <= x2 <= width` and
//! `0 <= y1 <= y2 <= height` with integral coordinates. Downstream code relies
//! on that and does no further bounds checks.

use image::imageops::{self, FilterType};

use crate::detect::{BoundingBox, Detection};
use crate::error::{RedactError, Result};
use crate::frame::{Frame, PixelRect};

/// Working copy for detection.
///
/// Returns `None` when `scale` is 1.0, meaning "detect on the original". The
/// copy is `floor(w * scale) x floor(h * scale)`, at least 1x1, resampled with
/// a linear filter.
pub fn downscale(frame: &Frame, scale: f32) -> Result<Option<Frame>> {
    if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
        return Err(RedactError::InvalidConfig(format!(
            "resize factor {} outside (0, 1]",
            scale
        )));
    }
    if scale == 1.0 {
        return Ok(None);
    }
    let width = ((frame.width() as f32 * scale) as u32).max(1);
    let height = ((frame.height() as f32 * scale) as u32).max(1);
    let resized = imageops::resize(frame.as_image(), width, height, FilterType::Triangle);
    Frame::from_image(resized).map(Some)
}

/// Map detections found at `inference_scale` back to a `width` x `height` frame.
///
/// Each coordinate is divided by the scale and rounded to the nearest pixel.
/// `x1`/`y1` are clamped into `[0, width)`/`[0, height)`, then `x2`/`y2` into
/// `[x1, width]`/`[y1, height]`. A zero-area result is valid output.
pub fn rectify(
    detections: &[Detection],
    inference_scale: f32,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    detections
        .iter()
        .map(|det| {
            let rect = rectify_box(&det.bbox(), inference_scale, width, height);
            det.with_bbox(BoundingBox::new(
                rect.x1 as f32,
                rect.y1 as f32,
                rect.x2 as f32,
                rect.y2 as f32,
            ))
        })
        .collect()
}

/// Box-level rectification into an integer rectangle.
pub fn rectify_box(bbox: &BoundingBox, inference_scale: f32, width: u32, height: u32) -> PixelRect {
    let scale = if inference_scale.is_finite() && inference_scale > 0.0 {
        inference_scale
    } else {
        1.0
    };
    let to_pixel = |v: f32| -> i64 {
        let v = (v / scale).round();
        if v.is_finite() {
            v as i64
        } else {
            0
        }
    };

    let max_x = width as i64;
    let max_y = height as i64;

    let x1 = to_pixel(bbox.x1).clamp(0, (max_x - 1).max(0));
    let y1 = to_pixel(bbox.y1).clamp(0, (max_y - 1).max(0));
    let x2 = to_pixel(bbox.x2).clamp(x1, max_x.max(x1));
    let y2 = to_pixel(bbox.y2).clamp(y1, max_y.max(y1));

    PixelRect::new(x1 as u32, y1 as u32, x2 as u32, y2 as u32)
}

/// Integer rectangle of a box already in rectified form.
pub(crate) fn pixel_rect(bbox: &BoundingBox) -> PixelRect {
    let to_u32 = |v: f32| v.max(0.0).round() as u32;
    PixelRect::new(to_u32(bbox.x1), to_u32(bbox.y1), to_u32(bbox.x2), to_u32(bbox.y2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(2, "BUTTOCKS_EXPOSED", 0.9, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn resize_round_trip() {
        let out = rectify(&[det(100.0, 100.0, 200.0, 200.0)], 0.5, 1000, 1000);
        assert_eq!(out[0].bbox(), BoundingBox::new(200.0, 200.0, 400.0, 400.0));
        assert_eq!(out[0].class_name(), "BUTTOCKS_EXPOSED");
        assert_eq!(out[0].confidence(), 0.9);
    }

    #[test]
    fn rounds_to_nearest_pixel() {
        let rect = rectify_box(&BoundingBox::new(10.2, 10.6, 20.5, 20.4), 1.0, 100, 100);
        assert_eq!(rect, PixelRect::new(10, 11, 21, 20));
    }

    #[test]
    fn clamps_out_of_bounds_and_inverted_boxes() {
        let rect = rectify_box(&BoundingBox::new(-50.0, -5.0, 500.0, 80.0), 1.0, 100, 60);
        assert_eq!(rect, PixelRect::new(0, 0, 100, 60));

        let inverted = rectify_box(&BoundingBox::new(40.0, 40.0, 10.0, 10.0), 1.0, 100, 100);
        assert_eq!(inverted, PixelRect::new(40, 40, 40, 40));
        assert!(inverted.is_empty());

        let past_edge = rectify_box(&BoundingBox::new(150.0, 150.0, 160.0, 160.0), 1.0, 100, 100);
        assert_eq!(past_edge, PixelRect::new(99, 99, 100, 100));
    }

    #[test]
    fn coordinate_invariant_holds_across_scales() {
        let boxes = [
            BoundingBox::new(-1e6, 3.0, 1e6, 2.0),
            BoundingBox::new(f32::NAN, 0.0, f32::INFINITY, 10.0),
            BoundingBox::new(5.5, 5.5, 5.4, 900.0),
            BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        ];
        for scale in [0.01f32, 0.3, 0.5, 1.0, 2.0, 7.5] {
            for (width, height) in [(1u32, 1u32), (17, 3), (640, 480)] {
                for bbox in &boxes {
                    let r = rectify_box(bbox, scale, width, height);
                    assert!(r.x1 <= r.x2 && r.x2 <= width, "{:?} at {}", r, scale);
                    assert!(r.y1 <= r.y2 && r.y2 <= height, "{:?} at {}", r, scale);
                }
            }
        }
    }

    #[test]
    fn downscale_is_skipped_at_unit_scale() {
        let frame = Frame::new(10, 10).unwrap();
        assert!(downscale(&frame, 1.0).unwrap().is_none());
    }

    #[test]
    fn downscale_floors_dimensions() {
        let frame = Frame::new(101, 33).unwrap();
        let copy = downscale(&frame, 0.5).unwrap().unwrap();
        assert_eq!(copy.dimensions(), (50, 16));

        let tiny = downscale(&Frame::new(2, 2).unwrap(), 0.1).unwrap().unwrap();
        assert_eq!(tiny.dimensions(), (1, 1));
    }

    #[test]
    fn downscale_rejects_bad_factors() {
        let frame = Frame::new(10, 10).unwrap();
        for bad in [0.0f32, -0.5, 1.5, f32::NAN] {
            assert!(matches!(
                downscale(&frame, bad),
                Err(RedactError::InvalidConfig(_))
            ));
        }
    }
}
