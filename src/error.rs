//! Shared error types for training.

use thiserror::Error;

/// Errors produced while constructing or loading images.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Data and label planes must have identical dimensions.
    #[error("data plane is {data:?} but label plane is {labels:?}; dimensions must match")]
    ShapeMismatch {
        data: (usize, usize),
        labels: (usize, usize),
    },

    /// Opaque failure inside an [`ImageSource`](crate::image::ImageSource)
    /// implementation (decoder error, allocation failure, missing file).
    #[error("image source failure: {0}")]
    Source(String),
}

/// Errors that can abort a training run.
///
/// Empty frontier nodes and degenerate splits are *not* errors; they
/// terminate the affected node as a leaf and training continues.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid parameter combination, detected before any training starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Image loading or validation failed; the run aborts.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A runtime resource could not be acquired (e.g. the worker pool).
    #[error("resource unavailable: {0}")]
    Resource(String),
}
