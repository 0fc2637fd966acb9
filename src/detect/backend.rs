use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::InferenceView;

/// Per-call limits passed down to a backend.
///
/// Backends may use them to prune early (score pre-filter, NMS output cap);
/// the adapter enforces both again on whatever comes back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectLimits {
    pub confidence_threshold: f32,
    pub max_detections: usize,
}

/// Detector backend trait.
///
/// # Audit Boundary
///
/// Implementations MUST be manually audited to ensure they:
/// - Do not store pixels beyond the `detect` call
/// - Do not write frames to disk
/// - Do not make network requests
///
/// Backends are driven through `DetectorAdapter`, which holds each loaded
/// model behind a mutex, so `detect` never runs concurrently on one instance.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// False while the underlying model is not loaded.
    fn is_ready(&self) -> bool {
        true
    }

    /// Run detection on a frame.
    ///
    /// Boxes MUST be reported in the pixel space of `view`. A backend that
    /// resizes internally (fixed model input) maps its boxes back before
    /// returning. Must accept a different frame size on every call.
    fn detect(&mut self, view: &InferenceView<'_>, limits: DetectLimits)
        -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
