use std::sync::{Arc, Mutex};

use crate::detect::backend::{DetectLimits, DetectorBackend};
use crate::detect::result::{Detection, RawDetection};
use crate::error::{RedactError, Result};
use crate::frame::Frame;
use crate::labels::LabelRegistry;

/// Thread-safe wrapper around one loaded detector backend.
///
/// The backend sits behind a `Mutex` because `DetectorBackend::detect` takes
/// `&mut self`: only one inference runs at a time per loaded model. Cloning the
/// adapter shares the same model instance.
#[derive(Clone)]
pub struct DetectorAdapter {
    backend: Arc<Mutex<dyn DetectorBackend>>,
    name: &'static str,
    labels: LabelRegistry,
}

impl DetectorAdapter {
    pub fn new<B: DetectorBackend + 'static>(backend: B, labels: LabelRegistry) -> Self {
        let name = backend.name();
        Self {
            backend: Arc::new(Mutex::new(backend)),
            name,
            labels,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.name
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    /// Fails with `ModelNotReady` unless the backend can serve inference.
    pub fn ensure_ready(&self) -> Result<()> {
        let guard = self
            .backend
            .lock()
            .map_err(|_| RedactError::ModelNotReady("detector lock poisoned".into()))?;
        if guard.is_ready() {
            Ok(())
        } else {
            Err(RedactError::ModelNotReady(format!(
                "backend '{}' has no loaded model",
                self.name
            )))
        }
    }

    /// Run the backend warm-up hook. A failure here is fatal for the pipeline.
    pub fn warm_up(&self) -> Result<()> {
        self.ensure_ready()?;
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| RedactError::ModelNotReady("detector lock poisoned".into()))?;
        guard.warm_up().map_err(|err| {
            RedactError::ModelNotReady(format!("backend '{}' warm-up failed: {:#}", self.name, err))
        })?;
        log::info!("detector backend '{}' warmed up", self.name);
        Ok(())
    }

    /// Detect on `frame`. Boxes are in `frame`'s pixel space.
    ///
    /// Keeps detections with `confidence >= confidence_threshold`. When more than
    /// `max_detections` remain, the lowest-confidence ones are dropped; the
    /// survivors keep the backend's native order.
    pub fn detect(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
        max_detections: usize,
    ) -> Result<Vec<Detection>> {
        if !(confidence_threshold > 0.0 && confidence_threshold < 1.0) {
            return Err(RedactError::InvalidConfig(format!(
                "confidence threshold {} outside (0, 1)",
                confidence_threshold
            )));
        }
        if max_detections == 0 {
            return Err(RedactError::InvalidConfig(
                "max_detections must be at least 1".into(),
            ));
        }
        if frame.width() == 0 || frame.height() == 0 {
            return Err(RedactError::InvalidFrame("zero-sized frame".into()));
        }

        let limits = DetectLimits {
            confidence_threshold,
            max_detections,
        };
        let raw = {
            let mut guard = self
                .backend
                .lock()
                .map_err(|_| RedactError::ModelNotReady("detector lock poisoned".into()))?;
            if !guard.is_ready() {
                return Err(RedactError::ModelNotReady(format!(
                    "backend '{}' has no loaded model",
                    self.name
                )));
            }
            guard
                .detect(&frame.inference_view(), limits)
                .map_err(RedactError::DetectionFailure)?
        };

        let kept: Vec<RawDetection> = raw
            .into_iter()
            .filter(|det| {
                let sane = det.confidence.is_finite() && det.bbox.is_finite();
                if !sane {
                    log::debug!("dropping non-finite detection from '{}'", self.name);
                }
                sane && det.confidence >= confidence_threshold
            })
            .collect();

        Ok(cap_by_confidence(kept, max_detections)
            .into_iter()
            .map(|det| {
                Detection::new(
                    det.class_id,
                    self.labels.resolve(det.class_id),
                    det.confidence,
                    det.bbox,
                )
            })
            .collect())
    }
}

/// Keep the `max` highest-confidence entries without reordering the survivors.
fn cap_by_confidence(mut detections: Vec<RawDetection>, max: usize) -> Vec<RawDetection> {
    if detections.len() <= max {
        return detections;
    }
    let mut order: Vec<usize> = (0..detections.len()).collect();
    // Stable: equal scores keep native order, so later ones are dropped first.
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });
    let mut keep = vec![false; detections.len()];
    for &idx in order.iter().take(max) {
        keep[idx] = true;
    }
    let mut flags = keep.into_iter();
    detections.retain(|_| flags.next().unwrap_or(false));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use crate::detect::result::BoundingBox;

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection::new(class_id, confidence, BoundingBox::new(0.0, 0.0, 4.0, 4.0))
    }

    fn frame() -> Frame {
        Frame::new(8, 8).unwrap()
    }

    #[test]
    fn resolves_names_and_filters_threshold() {
        let stub = StubBackend::with_detections(vec![raw(2, 0.9), raw(3, 0.2), raw(99, 0.6)]);
        let adapter = DetectorAdapter::new(stub, LabelRegistry::exposure());

        let found = adapter.detect(&frame(), 0.5, 10).unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.class_name()).collect();
        assert_eq!(names, vec!["BUTTOCKS_EXPOSED", "CLASS_99"]);
    }

    #[test]
    fn cap_drops_lowest_confidence_and_keeps_native_order() {
        let stub = StubBackend::with_detections(vec![
            raw(0, 0.7),
            raw(1, 0.3),
            raw(2, 0.9),
            raw(3, 0.5),
        ]);
        let adapter = DetectorAdapter::new(stub, LabelRegistry::exposure());

        let found = adapter.detect(&frame(), 0.1, 2).unwrap();
        let ids: Vec<u32> = found.iter().map(|d| d.class_id()).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn unloaded_backend_reports_model_not_ready() {
        let adapter = DetectorAdapter::new(StubBackend::unloaded(), LabelRegistry::exposure());
        assert!(matches!(
            adapter.ensure_ready(),
            Err(RedactError::ModelNotReady(_))
        ));
        assert!(matches!(
            adapter.detect(&frame(), 0.5, 10),
            Err(RedactError::ModelNotReady(_))
        ));
    }

    #[test]
    fn backend_errors_become_detection_failures() {
        let adapter = DetectorAdapter::new(
            StubBackend::failing("inference exploded"),
            LabelRegistry::exposure(),
        );
        let err = adapter.detect(&frame(), 0.5, 10).unwrap_err();
        assert!(matches!(err, RedactError::DetectionFailure(_)));
        assert!(err.to_string().contains("inference exploded"));
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let adapter = DetectorAdapter::new(StubBackend::new(), LabelRegistry::exposure());
        assert!(matches!(
            adapter.detect(&frame(), 1.0, 10),
            Err(RedactError::InvalidConfig(_))
        ));
        assert!(matches!(
            adapter.detect(&frame(), 0.5, 0),
            Err(RedactError::InvalidConfig(_))
        ));
    }

    #[test]
    fn accepts_changing_frame_sizes() {
        let adapter = DetectorAdapter::new(
            StubBackend::with_detections(vec![raw(2, 0.9)]),
            LabelRegistry::exposure(),
        );
        for (w, h) in [(8, 8), (64, 32), (3, 100)] {
            let frame = Frame::new(w, h).unwrap();
            assert_eq!(adapter.detect(&frame, 0.5, 10).unwrap().len(), 1);
        }
    }
}
