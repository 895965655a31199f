use std::path::PathBuf;
use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for segmentation inference.
///
/// Each variant carries the context of its domain (filesystem, image decoding,
/// model execution, ...) so callers can report a failure without parsing
/// error strings.
#[derive(Error, Debug)]
pub enum SegInferError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxedError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SegInferError>;

impl SegInferError {
    pub(crate) fn image(
        path: impl Into<String>,
        operation: &str,
        source: impl Into<BoxedError>,
    ) -> Self {
        Self::ImageProcessing {
            path: path.into(),
            operation: operation.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn model(operation: &str, source: impl Into<BoxedError>) -> Self {
        Self::Model {
            operation: operation.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_option(option: &str, mode: &str) -> Self {
        Self::Configuration {
            message: format!("`{option}` is required when running {mode} inference"),
        }
    }
}

/// Convert anyhow errors to configuration errors.
impl From<anyhow::Error> for SegInferError {
    fn from(err: anyhow::Error) -> Self {
        SegInferError::Configuration {
            message: err.to_string(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should construct
/// `SegInferError::FileSystem` directly instead.
impl From<std::io::Error> for SegInferError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for SegInferError {
    fn from(err: image::ImageError) -> Self {
        Self::image("unknown", "image processing", err)
    }
}

impl From<ort::Error> for SegInferError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come out of tensor plumbing around the model, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for SegInferError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
