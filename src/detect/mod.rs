mod adapter;
mod backend;
mod backends;
mod nms;
mod result;

pub use adapter::DetectorAdapter;
pub use backend::{DetectLimits, DetectorBackend};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::non_max_suppression;
pub use result::{BoundingBox, Detection, RawDetection};
