//! Ternary weight codec and shared-memory tile layout.
//!
//! Weights are signed ternary coefficients packed 2 bits each, 16 codes
//! per little-endian 32-bit word, `lanes` codes per tile. A row of K
//! coefficients occupies `tiles_per_row(K)` consecutive tiles with zero
//! padding beyond column K-1; rows follow each other at a constant byte
//! stride, so the tiling engine can address row `r` as
//! `base + r * row_stride` without any per-row bookkeeping.
//!
//! Encoding: `00` = 0, `01` = +1, `10` = -1, `11` reserved. The codec
//! never produces the reserved code; finding one while decoding means the
//! region was corrupted.

use crate::error::{BitnetError, Result};
use bitnet_chip::HwBuild;
use bytes::Bytes;

const CODE_ZERO: u32 = 0b00;
const CODE_PLUS: u32 = 0b01;
const CODE_MINUS: u32 = 0b10;
const CODES_PER_WORD: usize = 16;

/// A ternary matrix packed into the hardware tile layout.
#[derive(Debug, Clone)]
pub struct PackedMatrix {
    /// Packed little-endian words, ready for the weight region.
    pub data: Bytes,
    /// Output dimension M.
    pub rows: usize,
    /// Input dimension K.
    pub cols: usize,
    /// Byte stride between consecutive rows (constant for a given K).
    pub row_stride: usize,
}

impl PackedMatrix {
    /// Total packed size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

fn encode(weight: i8, row: usize, col: usize) -> Result<u32> {
    match weight {
        0 => Ok(CODE_ZERO),
        1 => Ok(CODE_PLUS),
        -1 => Ok(CODE_MINUS),
        other => Err(BitnetError::corrupt_weights(format!(
            "coefficient {other} at ({row}, {col}) is not ternary"
        ))),
    }
}

/// Pack one tile of up to `lanes` coefficients into 32-bit words.
///
/// Lanes beyond `weights.len()` are zero-filled, which is how partial
/// last tiles stay invisible to the hardware.
///
/// # Errors
///
/// Returns [`BitnetError::CorruptWeights`] for a non-ternary coefficient.
pub fn pack_tile(weights: &[i8], lanes: usize) -> Result<Vec<u32>> {
    debug_assert!(weights.len() <= lanes);
    let mut words = vec![0u32; lanes / CODES_PER_WORD];
    for (i, &w) in weights.iter().enumerate() {
        words[i / CODES_PER_WORD] |= encode(w, 0, i)? << ((i % CODES_PER_WORD) * 2);
    }
    Ok(words)
}

/// Pack an M x K row-major ternary matrix into the tile layout.
///
/// Layout guarantee: tile `t` of row `r` lands at byte offset
/// `r * tiles_per_row * bytes_per_tile + t * bytes_per_tile`, and
/// `row_stride` depends only on K — never on M.
///
/// # Errors
///
/// Returns [`BitnetError::CorruptWeights`] if `weights.len() != m * k` or
/// any coefficient is outside {-1, 0, +1}.
pub fn pack_matrix(weights: &[i8], m: usize, k: usize, hw: &HwBuild) -> Result<PackedMatrix> {
    if weights.len() != m * k {
        return Err(BitnetError::corrupt_weights(format!(
            "matrix has {} coefficients, expected {m}x{k}={}",
            weights.len(),
            m * k
        )));
    }

    let lanes = hw.lanes;
    let tiles_per_row = hw.tiles_per_row(k);
    let row_stride = hw.row_stride(k);
    let mut data = vec![0u8; m * row_stride];

    for row in 0..m {
        for tile in 0..tiles_per_row {
            let col_start = tile * lanes;
            let col_end = (col_start + lanes).min(k);
            let mut words = vec![0u32; hw.words_per_tile()];
            for (i, col) in (col_start..col_end).enumerate() {
                let code = encode(weights[row * k + col], row, col)?;
                words[i / CODES_PER_WORD] |= code << ((i % CODES_PER_WORD) * 2);
            }
            let base = row * row_stride + tile * hw.bytes_per_tile();
            for (w, word) in words.iter().enumerate() {
                data[base + w * 4..base + w * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
        }
    }

    tracing::debug!(
        "Packed {m}x{k} matrix: {tiles_per_row} tiles/row, stride {row_stride} B, total {} B",
        data.len()
    );

    Ok(PackedMatrix {
        data: Bytes::from(data),
        rows: m,
        cols: k,
        row_stride,
    })
}

/// Decode one coefficient from packed bytes. Used by the software oracle,
/// which mirrors hardware behavior: the reserved code reads as 0.
pub(crate) fn decode_lenient(data: &[u8], row: usize, col: usize, k: usize, hw: &HwBuild) -> i8 {
    let tile = col / hw.lanes;
    let lane = col % hw.lanes;
    let byte = row * hw.row_stride(k) + tile * hw.bytes_per_tile() + lane / 4;
    if byte >= data.len() {
        return 0;
    }
    match (data[byte] >> ((lane % 4) * 2)) & 0b11 {
        0b01 => 1,
        0b10 => -1,
        _ => 0,
    }
}

/// Unpack an M x K matrix from the tile layout, recovering the original
/// coefficients exactly.
///
/// # Errors
///
/// Returns [`BitnetError::CorruptWeights`] if the buffer is too short or
/// any 2-bit field holds the reserved code `11` — the codec never writes
/// it, so its presence signals corruption of the weight region.
pub fn unpack_matrix(data: &[u8], m: usize, k: usize, hw: &HwBuild) -> Result<Vec<i8>> {
    let row_stride = hw.row_stride(k);
    if data.len() < m * row_stride {
        return Err(BitnetError::corrupt_weights(format!(
            "packed buffer of {} bytes is short of {m} rows x {row_stride} B",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(m * k);
    for row in 0..m {
        for col in 0..k {
            let tile = col / hw.lanes;
            let lane = col % hw.lanes;
            let byte = row * row_stride + tile * hw.bytes_per_tile() + lane / 4;
            match (data[byte] >> ((lane % 4) * 2)) & 0b11 {
                0b00 => out.push(0),
                0b01 => out.push(1),
                0b10 => out.push(-1),
                _ => {
                    return Err(BitnetError::corrupt_weights(format!(
                        "reserved code 11 at ({row}, {col})"
                    )))
                }
            }
        }
    }
    Ok(out)
}
