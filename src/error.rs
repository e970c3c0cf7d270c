use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by skew estimation, cropping and the image collaborators
#[derive(Debug, Error)]
pub enum DeskewError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("skew detection failed: {0}")]
    SkewDetectionFailed(String),

    #[error("rotation failed: {0}")]
    RotationFailed(String),

    #[error("invalid crop region: {0}")]
    InvalidCropRegion(String),

    #[error("failed to decode image {path:?}")]
    DecodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image {path:?}")]
    EncodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, DeskewError>;
