#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectLimits, DetectorBackend};
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::InferenceView;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output shaped `[1, 4 + classes, anchors]` where each anchor
/// carries `cx, cy, w, h` in model-input pixels followed by per-class scores.
/// Frames of any size are stretched to the square model input; boxes are mapped
/// back into the pixel space of the frame that was handed in.
///
/// This backend loads a local model file. It does not perform network I/O or
/// write to disk beyond model loading.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    nms_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be > 0"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX detector {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            nms_threshold: 0.45,
        })
    }

    /// Override the default NMS IoU threshold.
    pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
        self.nms_threshold = threshold;
        self
    }

    fn build_input(&self, view: &InferenceView<'_>) -> Tensor {
        let side = self.input_size;
        let resized;
        let image = if view.width() == side && view.height() == side {
            view.image()
        } else {
            resized = imageops::resize(view.image(), side, side, FilterType::Triangle);
            &resized
        };

        let side = side as usize;
        let pixels = image.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            pixels[(y * side + x) * 3 + c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        view: &InferenceView<'_>,
        limits: DetectLimits,
    ) -> Result<Vec<RawDetection>> {
        let input = self.build_input(view);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        decode_yolo(
            scores,
            self.input_size,
            view.width(),
            view.height(),
            limits,
            self.nms_threshold,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let blank = tract_ndarray::Array4::<f32>::zeros((1, 3, side, side)).into_tensor();
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}

/// Decode a `[1, 4 + classes, anchors]` YOLO head into detections in view space.
///
/// Each anchor keeps its best-scoring class; anchors below the call's threshold
/// or with a non-finite or empty box are dropped before NMS. Boxes come out of
/// the model in `input_size` x `input_size` pixels and are stretched back to
/// `view_width` x `view_height`.
pub fn decode_yolo(
    scores: tract_ndarray::ArrayViewD<'_, f32>,
    input_size: u32,
    view_width: u32,
    view_height: u32,
    limits: DetectLimits,
    nms_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let shape = scores.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(anyhow!(
            "unexpected detector output shape {:?}, want [1, 4 + classes, anchors]",
            shape
        ));
    }
    if input_size == 0 {
        return Err(anyhow!("model input size must be > 0"));
    }
    let rows = shape[1];
    let anchors = shape[2];

    let sx = view_width as f32 / input_size as f32;
    let sy = view_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for a in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|r| (r - 4, scores[[0, r, a]]))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < limits.confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            scores[[0, 0, a]],
            scores[[0, 1, a]],
            scores[[0, 2, a]],
            scores[[0, 3, a]],
        );
        if !bbox.is_finite() || bbox.area() <= 0.0 {
            continue;
        }
        candidates.push(RawDetection::new(class_id as u32, score, bbox.scale(sx, sy)));
    }

    Ok(non_max_suppression(
        candidates,
        nms_threshold,
        limits.max_detections,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: DetectLimits = DetectLimits {
        confidence_threshold: 0.5,
        max_detections: 10,
    };

    /// `anchors` columns of `(cx, cy, w, h, scores...)`.
    fn head(classes: usize, anchors: &[(f32, f32, f32, f32, Vec<f32>)]) -> tract_ndarray::ArrayD<f32> {
        let mut out = tract_ndarray::Array3::<f32>::zeros((1, 4 + classes, anchors.len()));
        for (a, (cx, cy, w, h, class_scores)) in anchors.iter().enumerate() {
            out[[0, 0, a]] = *cx;
            out[[0, 1, a]] = *cy;
            out[[0, 2, a]] = *w;
            out[[0, 3, a]] = *h;
            for (c, score) in class_scores.iter().enumerate() {
                out[[0, 4 + c, a]] = *score;
            }
        }
        out.into_dyn()
    }

    #[test]
    fn maps_boxes_back_to_non_square_view() {
        let output = head(3, &[(320.0, 320.0, 64.0, 128.0, vec![0.1, 0.2, 0.9])]);
        let found = decode_yolo(output.view(), 640, 1280, 320, LIMITS, 0.45).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 2);
        assert_eq!(found[0].confidence, 0.9);
        // x stretched by 2, y squeezed by 0.5.
        assert_eq!(found[0].bbox, BoundingBox::new(576.0, 128.0, 704.0, 192.0));
    }

    #[test]
    fn drops_anchors_below_threshold() {
        let output = head(
            2,
            &[
                (100.0, 100.0, 20.0, 20.0, vec![0.3, 0.4]),
                (300.0, 300.0, 20.0, 20.0, vec![0.8, 0.1]),
            ],
        );
        let found = decode_yolo(output.view(), 640, 640, 640, LIMITS, 0.45).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 0);
        assert_eq!(found[0].bbox, BoundingBox::new(290.0, 290.0, 310.0, 310.0));
    }

    #[test]
    fn overlapping_anchors_go_through_nms() {
        let output = head(
            1,
            &[
                (100.0, 100.0, 40.0, 40.0, vec![0.9]),
                (102.0, 100.0, 40.0, 40.0, vec![0.7]),
            ],
        );
        let found = decode_yolo(output.view(), 640, 640, 640, LIMITS, 0.45).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, 0.9);
    }

    #[test]
    fn rejects_head_without_class_rows() {
        let output = tract_ndarray::Array3::<f32>::zeros((1, 4, 8)).into_dyn();
        let err = decode_yolo(output.view(), 640, 640, 640, LIMITS, 0.45).unwrap_err();
        assert!(err.to_string().contains("unexpected detector output shape"));
    }
}
