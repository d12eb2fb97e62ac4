use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the eraser pipeline.
///
/// Each variant carries the context of its failure domain (filesystem, pixel work,
/// model lifecycle, export) so diagnostics can be logged in full while the session
/// controller maps every variant onto a short, fixed user-facing message.
#[derive(Error, Debug)]
pub enum EraserError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model not initialized")]
    ModelNotLoaded,

    #[error("Unrecognized mask shape: {shape}")]
    UnrecognizedMask { shape: String },

    #[error("Dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Unsupported source image: {reason}")]
    UnsupportedSource { reason: String },

    #[error("Encoding {format} failed")]
    Encode {
        format: String,
        #[source]
        source: BoxError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Network error: fetching {url} failed")]
    Network {
        url: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, EraserError>;

impl EraserError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn model(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn image(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ImageProcessing {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build `EraserError::FileSystem`
/// directly; this is the fallback for bare `?` sites.
impl From<std::io::Error> for EraserError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for EraserError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for EraserError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come from tensor reshaping during inference, so they count as model errors.
impl From<ndarray::ShapeError> for EraserError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for EraserError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = EraserError::DimensionMismatch {
            expected: (10, 20),
            actual: (5, 5),
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 10x20, got 5x5");
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EraserError = io.into();
        match err {
            EraserError::FileSystem { operation, source, .. } => {
                assert_eq!(operation, "unknown");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected FileSystem error, got {other:?}"),
        }
    }
}
