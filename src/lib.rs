//! Redaction Kernel
//!
//! Per-frame detection-to-redaction pipeline: wraps an object detector and,
//! for every detection of a sensitive class above the confidence threshold,
//! obscures that region of the frame before it is handed back.
//!
//! # Pipeline
//!
//! ```text
//! frame -> [cache] -> downscale -> detect -> rectify -> select -> composite -> [cache]
//! ```
//!
//! - Boxes are produced on a possibly downscaled working copy and mapped back
//!   to original pixels in exactly one place (`rectify`).
//! - Compositing always runs on the original-resolution frame, in place.
//! - Per-frame failures are contained: the caller gets its frame back
//!   unmodified with no detections. Only `ModelNotReady` at construction halts.
//!
//! # Module Structure
//!
//! - `frame`: owned pixel buffers, inference views, pixel rectangles
//! - `labels`: class id -> name table and the redact set
//! - `detect`: backend trait, detector adapter, stub and ONNX backends
//! - `rectify`: working-copy downscale and box rectification
//! - `select`: redaction region selection
//! - `composite`: blur chain and soft-edge blending
//! - `cache`: TTL result cache keyed by frame id
//! - `pipeline`: the orchestrator
//! - `config`: configuration snapshot loading

pub mod cache;
pub mod composite;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod labels;
pub mod pipeline;
pub mod rectify;
pub mod select;

pub use cache::TemporalCache;
pub use composite::{composite, BlurSettings, BlurStage};
pub use config::RedactConfig;
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    BoundingBox, DetectLimits, Detection, DetectorAdapter, DetectorBackend, RawDetection,
    StubBackend,
};
pub use error::{RedactError, Result};
pub use frame::{Frame, InferenceView, PixelRect};
pub use labels::{LabelRegistry, RedactSet};
pub use pipeline::{Pipeline, PipelineStats, ProcessRequest, Redacted};
pub use rectify::rectify;
pub use select::{select, RedactionRegion};
