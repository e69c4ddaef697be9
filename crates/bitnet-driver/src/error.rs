//! Error types for BitNet accelerator operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, BitnetError>;

/// Errors that can occur while driving the accelerator.
#[derive(Debug, Error)]
pub enum BitnetError {
    /// Memory-mapped I/O setup failed. Fatal: nothing works without the
    /// register bank and weight region mappings.
    #[error("Device mapping failed for {region}: {reason}")]
    DeviceMap {
        /// Which physical region could not be mapped.
        region: String,
        /// Underlying cause.
        reason: String,
    },

    /// A tiling chunk did not signal DONE within its bound.
    #[error("Hardware timeout after {timeout_ms}ms at row offset {row_offset} (M={m}, K={k})")]
    Timeout {
        /// Poll bound that elapsed, in milliseconds.
        timeout_ms: u64,
        /// First output row of the chunk that timed out.
        row_offset: usize,
        /// Chunk output dimension.
        m: usize,
        /// Input dimension.
        k: usize,
    },

    /// Weight payload exceeds the mapped shared-memory span.
    #[error("Weight payload of {payload} bytes exceeds region span {span} at offset {offset:#x}")]
    WeightOverflow {
        /// Payload size in bytes.
        payload: usize,
        /// Destination region span in bytes.
        span: usize,
        /// Requested byte offset within the region.
        offset: usize,
    },

    /// A weight coefficient outside {-1, 0, +1} reached the codec, or a
    /// reserved 2-bit code was found while decoding (data corruption).
    #[error("Corrupt ternary weights: {reason}")]
    CorruptWeights {
        /// What was found and where.
        reason: String,
    },

    /// Dimensions exceed what the hardware build supports.
    #[error("Dimensions M={m}, K={k} unsupported by build {build} (max K={max_k})")]
    UnsupportedDims {
        /// Requested output dimension.
        m: usize,
        /// Requested input dimension.
        k: usize,
        /// Build name.
        build: &'static str,
        /// Build input-dimension limit.
        max_k: usize,
    },

    /// Register access violated the declared access mode.
    #[error("Access violation: {op} of {reg} is not permitted")]
    AccessViolation {
        /// "read" or "write".
        op: &'static str,
        /// Register name.
        reg: &'static str,
    },

    /// An operation required a result mode the build does not provide.
    #[error("Build {build} does not support {needed} results")]
    WrongResultMode {
        /// Build name.
        build: &'static str,
        /// "raw" or "shifted".
        needed: &'static str,
    },

    /// File could not be read during a weight load.
    #[error("Weight file {path}: {source}")]
    WeightFile {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl BitnetError {
    /// Create a device mapping error.
    pub fn device_map(region: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceMap {
            region: region.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt-weights error.
    pub fn corrupt_weights(reason: impl Into<String>) -> Self {
        Self::CorruptWeights {
            reason: reason.into(),
        }
    }
}
