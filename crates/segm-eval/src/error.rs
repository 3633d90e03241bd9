//! Error types for segmentation evaluation.

use thiserror::Error;

/// Result type for segm-eval operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Coarse classification of an [`EvalError`].
///
/// Every error returned by this crate aborts the evaluation unit that raised
/// it. Recoverable situations (missing predictions, sequences without ground
/// truth) are reported in the evaluation reports instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed RLE, JSON, or raster data.
    Format,
    /// Ground truth and prediction masks have different shapes.
    ShapeMismatch,
    /// A required file, directory, or archive entry does not exist.
    NotFound,
    /// Any other I/O failure.
    Io,
}

#[derive(Error, Debug)]
pub enum EvalError {
    /// Malformed run-length data.
    #[error("malformed RLE: {0}")]
    Rle(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A ground-truth raster could not be decoded or has an unsupported layout.
    #[error("raster error: {0}")]
    Raster(String),

    #[error("PNG decoding error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Two masks that must be compared pixel-for-pixel differ in shape.
    /// Shapes are `(height, width)`.
    #[error("shape mismatch for {key}: ground truth {expected:?} vs prediction {found:?}")]
    ShapeMismatch {
        key: String,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Rle(_)
            | EvalError::Json(_)
            | EvalError::Raster(_)
            | EvalError::Png(_)
            | EvalError::Archive(_) => ErrorKind::Format,
            EvalError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            EvalError::NotFound(_) => ErrorKind::NotFound,
            EvalError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            EvalError::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(EvalError::Rle("x".into()).kind(), ErrorKind::Format);
        let err = EvalError::ShapeMismatch {
            key: "a.jpg".into(),
            expected: (2, 2),
            found: (3, 2),
        };
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(err.to_string().contains("a.jpg"));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(EvalError::from(io).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_json_is_format() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert_eq!(EvalError::from(err).kind(), ErrorKind::Format);
    }
}
