use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::{DetectLimits, DetectorBackend};
use crate::detect::result::RawDetection;
use crate::frame::InferenceView;

/// Detections sidecar: either a bare array, or an object that also records
/// the size of the image the boxes were drawn on.
#[derive(Deserialize)]
#[serde(untagged)]
enum Sidecar {
    Sized {
        width: u32,
        height: u32,
        detections: Vec<RawDetection>,
    },
    Bare(Vec<RawDetection>),
}

/// Scripted backend for tests and offline replays.
///
/// Returns the same detections on every call. When a reference size is set,
/// scripted boxes are scaled from that size to the size of each frame they
/// are asked about, so a script authored against the original frame stays
/// correct when the pipeline hands over a downscaled working copy.
pub struct StubBackend {
    script: Vec<RawDetection>,
    reference_size: Option<(u32, u32)>,
    calls: Arc<AtomicUsize>,
    failure: Option<String>,
    ready: bool,
}

impl StubBackend {
    /// Backend that never finds anything.
    pub fn new() -> Self {
        Self::with_detections(Vec::new())
    }

    pub fn with_detections(script: Vec<RawDetection>) -> Self {
        Self {
            script,
            reference_size: None,
            calls: Arc::new(AtomicUsize::new(0)),
            failure: None,
            ready: true,
        }
    }

    /// Load raw detections (`class_id`, `confidence`, `bbox`) from JSON.
    ///
    /// Accepts a bare array, or `{"width", "height", "detections"}` where the
    /// size becomes the reference size. A bare array has no reference size;
    /// callers replaying it against a downscaled working copy must set one.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detections from {}", path.display()))?;
        let sidecar: Sidecar = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detections file {}: {}", path.display(), e))?;
        Ok(match sidecar {
            Sidecar::Sized {
                width,
                height,
                detections,
            } => Self::with_detections(detections).with_reference_size(width, height),
            Sidecar::Bare(detections) => Self::with_detections(detections),
        })
    }

    /// Backend whose every `detect` call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    /// Backend that reports no loaded model.
    pub fn unloaded() -> Self {
        Self {
            ready: false,
            ..Self::new()
        }
    }

    /// Scripted boxes were authored against a `width` x `height` frame.
    pub fn with_reference_size(mut self, width: u32, height: u32) -> Self {
        self.reference_size = Some((width, height));
        self
    }

    pub fn reference_size(&self) -> Option<(u32, u32)> {
        self.reference_size
    }

    /// Shared counter of `detect` invocations.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn detect(
        &mut self,
        view: &InferenceView<'_>,
        _limits: DetectLimits,
    ) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }

        let (sx, sy) = match self.reference_size {
            Some((w, h)) if w > 0 && h > 0 => (
                view.width() as f32 / w as f32,
                view.height() as f32 / h as f32,
            ),
            _ => (1.0, 1.0),
        };

        Ok(self
            .script
            .iter()
            .map(|det| RawDetection {
                bbox: det.bbox.scale(sx, sy),
                ..det.clone()
            })
            .collect())
    }
}
