//! Command register map for the BitNet accelerator.
//!
//! The accelerator exposes a small bank of 32-bit registers through the
//! HPS-to-FPGA lightweight bridge, byte-addressed from the accelerator's
//! base offset. Each register carries an access mode; the driver rejects
//! reads of write-only registers and writes to read-only ones instead of
//! trusting callers to remember the datasheet.
//!
//! The activation and result register arrays are **not** listed here:
//! their base offsets differ between hardware builds (observed result
//! bases: 0x800, 0x2000, 0x4000) and live in [`crate::build::HwBuild`].

/// Register access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Host may only read (status, diagnostics).
    ReadOnly,
    /// Host may only write (command pulse).
    WriteOnly,
    /// Host may read back what it wrote (configuration).
    ReadWrite,
}

/// A named 32-bit register: byte offset plus access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    /// Byte offset from the accelerator base.
    pub offset: usize,
    /// Permitted access direction.
    pub access: Access,
    /// Register name for diagnostics.
    pub name: &'static str,
}

impl Reg {
    /// True if the host is allowed to read this register.
    #[must_use]
    pub const fn readable(&self) -> bool {
        matches!(self.access, Access::ReadOnly | Access::ReadWrite)
    }

    /// True if the host is allowed to write this register.
    #[must_use]
    pub const fn writable(&self) -> bool {
        matches!(self.access, Access::WriteOnly | Access::ReadWrite)
    }
}

/// Command register — bit 0 is the start pulse.
pub const CTRL: Reg = Reg { offset: 0x00, access: Access::WriteOnly, name: "CTRL" };
/// Status register — bit 0 busy, bit 1 done.
pub const STATUS: Reg = Reg { offset: 0x04, access: Access::ReadOnly, name: "STATUS" };
/// Physical byte address of the weight tile in shared memory.
pub const WEIGHT_BASE: Reg = Reg { offset: 0x08, access: Access::ReadWrite, name: "WEIGHT_BASE" };
/// Output dimension for the current invocation.
pub const DIM_M: Reg = Reg { offset: 0x0C, access: Access::ReadWrite, name: "DIM_M" };
/// Input vector length.
pub const DIM_K: Reg = Reg { offset: 0x10, access: Access::ReadWrite, name: "DIM_K" };
/// Requantization shift amount (0-31); ignored by raw-accumulator builds.
pub const SHIFT_AMT: Reg = Reg { offset: 0x14, access: Access::ReadWrite, name: "SHIFT_AMT" };
/// Cycle count of the last run (diagnostic).
pub const PERF_CYCLES: Reg = Reg { offset: 0x18, access: Access::ReadOnly, name: "PERF_CYCLES" };

/// Status register bit definitions.
pub mod status {
    /// Accelerator is processing a start pulse.
    pub const BUSY: u32 = 1 << 0;
    /// Last invocation has completed; results are valid.
    pub const DONE: u32 = 1 << 1;
}

/// Control register bit definitions.
pub mod ctrl {
    /// Start pulse — write 1 to launch the configured matvec.
    pub const START: u32 = 1 << 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_offsets_match_datasheet() {
        assert_eq!(CTRL.offset, 0x00);
        assert_eq!(STATUS.offset, 0x04);
        assert_eq!(WEIGHT_BASE.offset, 0x08);
        assert_eq!(DIM_M.offset, 0x0C);
        assert_eq!(DIM_K.offset, 0x10);
        assert_eq!(SHIFT_AMT.offset, 0x14);
        assert_eq!(PERF_CYCLES.offset, 0x18);
    }

    #[test]
    fn access_modes() {
        assert!(!CTRL.readable());
        assert!(CTRL.writable());
        assert!(STATUS.readable());
        assert!(!STATUS.writable());
        assert!(DIM_M.readable() && DIM_M.writable());
        assert!(!PERF_CYCLES.writable());
    }
}
