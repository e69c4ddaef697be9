//! Tiling engine: one logical matvec across multiple hardware invocations.
//!
//! The accelerator computes at most `max_dim_m` output rows per start
//! pulse. For larger M the engine walks the output dimension in chunks,
//! re-pointing WEIGHT_BASE at `base + row_offset * row_stride` for each
//! one. Activations are written exactly once per call — they persist in
//! hardware-side storage across pulses, which is an explicit design
//! invariant of the accelerator, not an optimization.
//!
//! A chunk timeout zero-fills that chunk's rows and the walk continues;
//! the caller gets the partial result plus one [`ChunkTimeout`] record per
//! failed chunk and decides whether that is fatal (the layer pipeline
//! treats it as fatal to the inference, the process keeps running).

use crate::bus::AcceleratorBus;
use crate::error::{BitnetError, Result};
use bitnet_chip::regs::{ctrl, CTRL, DIM_K, DIM_M, SHIFT_AMT, WEIGHT_BASE};
use bitnet_chip::ResultMode;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on each chunk's DONE poll. One second is orders of magnitude
/// beyond any legitimate invocation at 50 MHz.
pub const CHUNK_TIMEOUT: Duration = Duration::from_secs(1);

/// One logical matrix-vector multiply.
#[derive(Debug, Clone, Copy)]
pub struct MatvecRequest {
    /// Output dimension; may exceed the hardware's per-invocation limit.
    pub m: usize,
    /// Input dimension; must not exceed the build's K limit.
    pub k: usize,
    /// Requantization shift (Shifted builds; ignored by Raw builds).
    pub shift: u32,
    /// Physical address of the packed weight matrix.
    pub weight_base: u32,
    /// Byte stride between weight rows (from the codec).
    pub row_stride: usize,
}

/// A chunk that never signalled DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTimeout {
    /// First output row of the chunk.
    pub row_offset: usize,
    /// Rows the chunk covered (zero-filled in the output).
    pub rows: usize,
}

/// Result of a tiled matvec: raw result-register words plus any timeouts.
#[derive(Debug, Clone)]
pub struct MatvecOutcome {
    /// One register word per output row, in row order. Rows belonging to a
    /// timed-out chunk are zero.
    pub words: Vec<u32>,
    /// Chunks that timed out, in row order.
    pub timeouts: Vec<ChunkTimeout>,
    mode: ResultMode,
}

impl MatvecOutcome {
    /// True when every chunk completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.timeouts.is_empty()
    }

    /// Interpret the result words as shifted/clamped INT8 values.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::WrongResultMode`] on a raw-accumulator build.
    pub fn as_i8(&self) -> Result<Vec<i8>> {
        if self.mode != ResultMode::Shifted {
            return Err(BitnetError::WrongResultMode { build: "raw-accumulator", needed: "shifted" });
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(self.words.iter().map(|&w| w as u8 as i8).collect())
    }

    /// Interpret the result words as raw 32-bit signed accumulators.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::WrongResultMode`] on a shifted-output build.
    pub fn as_raw(&self) -> Result<Vec<i32>> {
        if self.mode != ResultMode::Raw {
            return Err(BitnetError::WrongResultMode { build: "shifted-output", needed: "raw" });
        }
        #[allow(clippy::cast_possible_wrap)]
        Ok(self.words.iter().map(|&w| w as i32).collect())
    }
}

/// Drives tiled matvec calls over an [`AcceleratorBus`].
#[derive(Debug)]
pub struct TilingEngine<'a, B: AcceleratorBus + ?Sized> {
    bus: &'a mut B,
}

impl<'a, B: AcceleratorBus + ?Sized> TilingEngine<'a, B> {
    /// Borrow the bus for a sequence of matvec calls.
    pub fn new(bus: &'a mut B) -> Self {
        Self { bus }
    }

    /// Run one logical matvec, tiling over M as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::UnsupportedDims`] if K exceeds the build
    /// limit or the activation slice disagrees with `req.k`; register
    /// access errors propagate. Chunk timeouts do **not** error — they are
    /// reported in the outcome.
    pub fn run(&mut self, acts: &[i8], req: &MatvecRequest) -> Result<MatvecOutcome> {
        let hw = *self.bus.hw();
        if req.k > hw.max_dim_k || acts.len() != req.k {
            return Err(BitnetError::UnsupportedDims {
                m: req.m,
                k: req.k,
                build: hw.name,
                max_k: hw.max_dim_k,
            });
        }

        // Activations once per call; they persist across the chunk pulses.
        for (i, &a) in acts.iter().enumerate() {
            self.bus.write_activation(i, a)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            self.bus.reg_write(DIM_K, req.k as u32)?;
            self.bus.reg_write(SHIFT_AMT, req.shift)?;
        }

        let mut words = vec![0u32; req.m];
        let mut timeouts = Vec::new();
        let mut row_offset = 0usize;

        while row_offset < req.m {
            let chunk = (req.m - row_offset).min(hw.max_dim_m);
            #[allow(clippy::cast_possible_truncation)]
            let chunk_base = req.weight_base + (row_offset * req.row_stride) as u32;

            #[allow(clippy::cast_possible_truncation)]
            {
                self.bus.reg_write(WEIGHT_BASE, chunk_base)?;
                self.bus.reg_write(DIM_M, chunk as u32)?;
            }
            self.bus.reg_write(CTRL, ctrl::START)?;

            if self.bus.wait_done(CHUNK_TIMEOUT)? {
                for i in 0..chunk {
                    words[row_offset + i] = self.bus.read_result(i)?;
                }
                debug!("chunk done: rows {row_offset}..{} base {chunk_base:#x}", row_offset + chunk);
            } else {
                // Rows stay zero; record and keep walking.
                warn!(
                    "chunk timeout: rows {row_offset}..{} base {chunk_base:#x} (M={}, K={})",
                    row_offset + chunk,
                    req.m,
                    req.k
                );
                timeouts.push(ChunkTimeout { row_offset, rows: chunk });
            }

            row_offset += chunk;
        }

        Ok(MatvecOutcome {
            words,
            timeouts,
            mode: hw.result_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pack_matrix;
    use crate::reference::expected_matvec;
    use crate::software::SoftwareDevice;
    use bitnet_chip::HwBuild;

    fn offload(
        dev: &mut SoftwareDevice,
        weights: &[i8],
        acts: &[i8],
        m: usize,
        k: usize,
        shift: u32,
    ) -> MatvecOutcome {
        let hw = *dev.hw();
        let packed = pack_matrix(weights, m, k, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();
        let req = MatvecRequest {
            m,
            k,
            shift,
            weight_base: base,
            row_stride: packed.row_stride,
        };
        TilingEngine::new(dev).run(acts, &req).unwrap()
    }

    #[test]
    fn single_chunk_matches_reference() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64 * 1024);
        let (m, k, shift) = (16, 96, 2);
        let weights: Vec<i8> = (0..m * k).map(|i| [(-1i8), 0, 1][i % 3]).collect();
        let acts: Vec<i8> = (0..k).map(|i| (i % 7) as i8 - 3).collect();

        let out = offload(&mut dev, &weights, &acts, m, k, shift);
        assert!(out.is_complete());
        assert_eq!(out.as_i8().unwrap(), expected_matvec(&weights, &acts, m, k, shift));
    }

    #[test]
    fn tiling_is_transparent_for_large_m() {
        // M = 2.5 x max_dim_m: three chunks, last one partial. Row-by-row
        // equal to what a single unlimited invocation would produce.
        let hw = HwBuild {
            max_dim_m: 8,
            ..HwBuild::de10_rev_b()
        };
        let mut dev = SoftwareDevice::new(hw, 64 * 1024);
        let (m, k, shift) = (20, 64, 1);
        let weights: Vec<i8> = (0..m * k).map(|i| [(0i8), 1, -1, 1][i % 4]).collect();
        let acts: Vec<i8> = (0..k).map(|i| (i % 5) as i8).collect();

        let out = offload(&mut dev, &weights, &acts, m, k, shift);
        assert!(out.is_complete());
        assert_eq!(out.as_i8().unwrap(), expected_matvec(&weights, &acts, m, k, shift));
    }

    #[test]
    fn timeout_zero_fills_chunk_and_continues() {
        let hw = HwBuild {
            max_dim_m: 4,
            ..HwBuild::de10_rev_b()
        };
        let mut dev = SoftwareDevice::new(hw, 64 * 1024);
        let (m, k) = (12, 64);
        let weights = vec![1i8; m * k];
        let acts = vec![1i8; k];
        let packed = pack_matrix(&weights, m, k, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();

        // Hang the middle chunk (rows 4..8).
        dev.hang_at_weight_base(base + (4 * packed.row_stride) as u32);

        let req = MatvecRequest {
            m,
            k,
            shift: 0,
            weight_base: base,
            row_stride: packed.row_stride,
        };
        let out = TilingEngine::new(&mut dev).run(&acts, &req).unwrap();

        assert!(!out.is_complete());
        assert_eq!(out.timeouts, vec![ChunkTimeout { row_offset: 4, rows: 4 }]);
        let vals = out.as_i8().unwrap();
        assert!(vals[0..4].iter().all(|&v| v == 64));
        assert!(vals[4..8].iter().all(|&v| v == 0));
        assert!(vals[8..12].iter().all(|&v| v == 64));
    }

    #[test]
    fn no_state_leak_between_calls() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64 * 1024);
        // Run 1: all +1, acts 1 -> 64
        let out = offload(&mut dev, &[1i8; 64], &[1i8; 64], 1, 64, 0);
        assert_eq!(out.as_i8().unwrap(), vec![64]);
        // Run 2: all-zero weights, acts 100 -> 0 regardless of run 1
        let out = offload(&mut dev, &[0i8; 64], &[100i8; 64], 1, 64, 0);
        assert_eq!(out.as_i8().unwrap(), vec![0]);
    }

    #[test]
    fn oversized_k_rejected() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64 * 1024);
        let req = MatvecRequest {
            m: 1,
            k: 4096,
            shift: 0,
            weight_base: 0x3000_0000,
            row_stride: 16,
        };
        let err = TilingEngine::new(&mut dev).run(&[0i8; 4096], &req).unwrap_err();
        assert!(matches!(err, BitnetError::UnsupportedDims { .. }));
    }

    #[test]
    fn wrong_mode_accessors_refuse() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        let out = offload(&mut dev, &[1i8; 64], &[1i8; 64], 1, 64, 0);
        assert!(out.as_raw().is_err());

        let mut dev = SoftwareDevice::new(HwBuild::bitmamba(), 4096);
        let out = offload(&mut dev, &[1i8; 128], &[1i8; 128], 1, 128, 0);
        assert!(out.as_i8().is_err());
        assert_eq!(out.as_raw().unwrap(), vec![128]);
    }
}
