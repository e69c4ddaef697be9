//! Error types for model loading, preprocessing, and inference.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors from the model layer: weight bundles, image inputs, and the
/// driver faults they surface.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An input image could not be decoded. Batch callers report this
    /// per item and move on to the next file.
    #[error("malformed input {path}: {reason}")]
    MalformedInput {
        /// Offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// A weight bundle is internally inconsistent.
    #[error("bad weight bundle: {reason}")]
    WeightBundle {
        /// What was wrong with it.
        reason: String,
    },

    /// An activation vector does not match the layer it feeds.
    #[error("input has {got} activations, layer expects {expected}")]
    InputShape {
        /// Activations supplied.
        got: usize,
        /// Input dimension of the receiving layer.
        expected: usize,
    },

    /// I/O failure reading an input or weight file.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A driver-level fault (timeout, mapping, codec, dimensions).
    #[error(transparent)]
    Driver(#[from] bitnet_driver::BitnetError),
}

impl ModelError {
    /// Malformed-input constructor.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Weight-bundle constructor.
    pub fn weight_bundle(reason: impl Into<String>) -> Self {
        Self::WeightBundle {
            reason: reason.into(),
        }
    }
}
