//! Error types for the occlusion engine.

use thiserror::Error;

/// Engine-wide error type.
///
/// The rasterizer itself never fails; these cover the I/O, validation and
/// worker surfaces around it.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Packed box coordinates out of range or inverted
    #[error("Invalid box: {0}")]
    InvalidBox(String),

    /// A pass was started without being prepared
    #[error("Pass not ready (state {0})")]
    NotReady(&'static str),

    /// A pass was cancelled before completing
    #[error("Pass cancelled after {0} regions")]
    Cancelled(usize),

    /// A panic escaped region iteration
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
