use thiserror::Error;

/// Failure taxonomy for the redaction pipeline.
///
/// Only `ModelNotReady` at construction time is allowed to halt a caller.
/// Everything else is per-frame and is contained by `Pipeline::process`.
/// A cache miss is not an error; lookups return `Option`.
#[derive(Error, Debug)]
pub enum RedactError {
    /// The detector backend is not loaded or its lock is unusable.
    #[error("detector model not ready: {0}")]
    ModelNotReady(String),

    /// Malformed input frame (zero-sized, wrong channel count, length mismatch).
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Transient inference error raised by a backend.
    #[error("detection failed: {0:#}")]
    DetectionFailure(#[source] anyhow::Error),

    /// Configuration value outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for redaction operations.
pub type Result<T> = std::result::Result<T, RedactError>;
