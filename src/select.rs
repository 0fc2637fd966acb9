//! Region selection: which rectified detections must be redacted.

use std::ops::Deref;

use crate::detect::Detection;
use crate::frame::PixelRect;
use crate::labels::RedactSet;
use crate::rectify::pixel_rect;

/// A detection in original-frame coordinates that has been selected for redaction.
///
/// Only `select` builds these, from rectified detections, so the box is always
/// in-bounds and non-inverted.
#[derive(Clone, Debug, PartialEq)]
pub struct RedactionRegion(Detection);

impl RedactionRegion {
    pub fn detection(&self) -> &Detection {
        &self.0
    }

    pub fn into_detection(self) -> Detection {
        self.0
    }

    /// Integer box in frame pixels.
    pub fn rect(&self) -> PixelRect {
        pixel_rect(&self.0.bbox())
    }
}

impl Deref for RedactionRegion {
    type Target = Detection;

    fn deref(&self) -> &Detection {
        &self.0
    }
}

/// Stable filter over rectified detections.
///
/// A detection qualifies iff its class is in `redact_classes` AND
/// `confidence > confidence_threshold` (strict). Detector order is preserved.
pub fn select(
    detections: &[Detection],
    redact_classes: &RedactSet,
    confidence_threshold: f32,
) -> Vec<RedactionRegion> {
    if redact_classes.is_empty() {
        return Vec::new();
    }
    detections
        .iter()
        .filter(|det| {
            redact_classes.contains(det.class_name()) && det.confidence() > confidence_threshold
        })
        .cloned()
        .map(RedactionRegion)
        .collect()
}
