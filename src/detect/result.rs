use serde::{Deserialize, Serialize};

/// Axis-aligned box `(x1, y1, x2, y2)` in the pixel space of some frame.
///
/// Which frame is the caller's business: backend output is in the space of the
/// frame handed to the detector, rectified boxes are in original-frame space.
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Center/size form used by YOLO-style heads.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Multiply every coordinate by `sx` (x) and `sy` (y).
    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }

    /// Intersection over union; zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > f32::EPSILON {
            inter / union
        } else {
            0.0
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Backend output before label resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// One detector finding: box, class, confidence. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    class_id: u32,
    #[serde(rename = "class")]
    class_name: String,
    confidence: f32,
    bbox: BoundingBox,
}

impl Detection {
    pub fn new(
        class_id: u32,
        class_name: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Same finding with the box moved into another coordinate space.
    pub fn with_bbox(&self, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            ..self.clone()
        }
    }
}
