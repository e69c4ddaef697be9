//! Per-revision hardware parameters.
//!
//! Three builds of the accelerator have shipped, differing in lane count,
//! register array placement, dimension limits, and what the result array
//! holds. The register protocol (CTRL/STATUS/config registers) is identical
//! across builds; everything that varies is collected in [`HwBuild`] so the
//! driver never hard-codes a revision-specific value.

/// What the result register array holds after DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    /// Result words are the dot products shifted right by SHIFT_AMT and
    /// clamped to [-128, 127]; only the low byte of each word is meaningful.
    Shifted,
    /// Result words are the full 32-bit signed accumulators; SHIFT_AMT is
    /// ignored. No precision is lost.
    Raw,
}

/// Hardware-build configuration: everything revision-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwBuild {
    /// Human-readable revision name.
    pub name: &'static str,
    /// Parallel lanes per weight tile (weights consumed per beat).
    pub lanes: usize,
    /// Byte offset of `activation[0]`; element `i` lives at `act_base + i*4`.
    pub act_base: usize,
    /// Byte offset of `result[0]`; element `i` lives at `result_base + i*4`.
    pub result_base: usize,
    /// Largest input dimension a single invocation supports.
    pub max_dim_k: usize,
    /// Largest output dimension a single invocation supports; the tiling
    /// engine splits larger M across invocations.
    pub max_dim_m: usize,
    /// Result array contents for this build.
    pub result_mode: ResultMode,
}

impl HwBuild {
    /// First DE10-Nano build: 64 lanes, results at 0x800, shifted output.
    #[must_use]
    pub const fn de10_rev_a() -> Self {
        Self {
            name: "de10-rev-a",
            lanes: 64,
            act_base: 0x80,
            result_base: 0x800,
            max_dim_k: 256,
            max_dim_m: 512,
            result_mode: ResultMode::Shifted,
        }
    }

    /// Second DE10-Nano build: result array moved to 0x2000, which widens
    /// the activation window enough for a 784-pixel MNIST input.
    #[must_use]
    pub const fn de10_rev_b() -> Self {
        Self {
            name: "de10-rev-b",
            lanes: 64,
            act_base: 0x80,
            result_base: 0x2000,
            max_dim_k: 1024,
            max_dim_m: 1024,
            result_mode: ResultMode::Shifted,
        }
    }

    /// BitMamba build: 128 lanes, raw 32-bit accumulator output, results
    /// at 0x4000. Used for float pipelines that dequantize on the host.
    #[must_use]
    pub const fn bitmamba() -> Self {
        Self {
            name: "bitmamba",
            lanes: 128,
            act_base: 0x80,
            result_base: 0x4000,
            max_dim_k: 2048,
            max_dim_m: 1024,
            result_mode: ResultMode::Raw,
        }
    }

    /// Bytes per packed weight tile: 2 bits per lane.
    #[must_use]
    pub const fn bytes_per_tile(&self) -> usize {
        self.lanes / 4
    }

    /// 32-bit words per packed weight tile (16 codes per word).
    #[must_use]
    pub const fn words_per_tile(&self) -> usize {
        self.lanes / 16
    }

    /// Tiles needed to cover a K-length row, counting a partial last tile.
    #[must_use]
    pub const fn tiles_per_row(&self, k: usize) -> usize {
        k.div_ceil(self.lanes)
    }

    /// Byte stride between consecutive weight rows for a K-length row.
    ///
    /// Constant for a given K regardless of M, so row `r` of a matrix at
    /// `base` always starts at `base + r * row_stride`.
    #[must_use]
    pub const fn row_stride(&self, k: usize) -> usize {
        self.tiles_per_row(k) * self.bytes_per_tile()
    }
}

/// HPS-to-FPGA lightweight bridge physical base.
pub const LW_BRIDGE_BASE: u64 = 0xFF20_0000;
/// Lightweight bridge span (2 MB).
pub const LW_BRIDGE_SPAN: usize = 0x0020_0000;
/// Accelerator offset within the lightweight bridge (Platform Designer).
pub const ACCEL_OFFSET: usize = 0x0;
/// Default DDR3 weight region physical base (outside Linux-managed memory).
pub const DDR3_BASE: u64 = 0x3000_0000;
/// Default DDR3 weight region span (1 MB).
pub const DDR3_SPAN: usize = 0x0010_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_geometry_64_lane() {
        let b = HwBuild::de10_rev_b();
        assert_eq!(b.bytes_per_tile(), 16);
        assert_eq!(b.words_per_tile(), 4);
        assert_eq!(b.tiles_per_row(64), 1);
        assert_eq!(b.tiles_per_row(65), 2);
        assert_eq!(b.tiles_per_row(128), 2);
        assert_eq!(b.row_stride(96), 32);
    }

    #[test]
    fn tile_geometry_128_lane() {
        let b = HwBuild::bitmamba();
        assert_eq!(b.bytes_per_tile(), 32);
        assert_eq!(b.words_per_tile(), 8);
        assert_eq!(b.row_stride(2048), 16 * 32);
    }

    #[test]
    fn row_stride_covers_partial_tiles() {
        // K=100 and K=128 both span two 64-lane tiles; 129 spills into a third.
        let b = HwBuild::de10_rev_a();
        assert_eq!(b.row_stride(100), 2 * 16);
        assert_eq!(b.row_stride(128), 2 * 16);
        assert_eq!(b.row_stride(129), 3 * 16);
    }

    #[test]
    fn result_bases_differ_per_build() {
        assert_eq!(HwBuild::de10_rev_a().result_base, 0x800);
        assert_eq!(HwBuild::de10_rev_b().result_base, 0x2000);
        assert_eq!(HwBuild::bitmamba().result_base, 0x4000);
    }
}
