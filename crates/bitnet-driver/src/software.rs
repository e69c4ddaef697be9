//! Software oracle device.
//!
//! Implements [`AcceleratorBus`] with a bit-exact emulation of the
//! register protocol: activations persist across start pulses, weights
//! are decoded from the packed 2-bit layout exactly as the PE array reads
//! them, and results are produced in whichever mode the configured build
//! advertises. This gives three things the hardware cannot:
//!
//! 1. **CI without hardware** — the full driver stack (codec, tiling,
//!    layer pipeline, validation suite) runs against this device in tests.
//! 2. **Ground truth for validation** — `bitnet validate` compares real
//!    accelerator output against the same arithmetic this device runs.
//! 3. **Fault injection** — [`SoftwareDevice::hang_at_weight_base`] makes
//!    a start pulse never complete, exercising the timeout path.

use crate::bus::{check_readable, check_writable, AcceleratorBus};
use crate::codec::decode_lenient;
use crate::error::{BitnetError, Result};
use bitnet_chip::regs::{self, ctrl, status};
use bitnet_chip::{HwBuild, Reg, ResultMode};
use tracing::debug;

/// Emulated DDR physical base; arbitrary but matches the real platform so
/// addresses in logs look familiar.
const EMU_DDR_BASE: u32 = 0x3000_0000;

/// Pure-software accelerator with the same register-level contract as the
/// memory-mapped device.
#[derive(Debug)]
pub struct SoftwareDevice {
    hw: HwBuild,
    // Configuration registers
    weight_base: u32,
    dim_m: u32,
    dim_k: u32,
    shift_amt: u32,
    status: u32,
    perf_cycles: u32,
    // Hardware-side storage
    activations: Vec<i8>,
    results: Vec<u32>,
    ddr: Vec<u8>,
    // Fault injection: a start pulse with this WEIGHT_BASE never completes.
    hang_at: Option<u32>,
}

impl SoftwareDevice {
    /// Create an oracle for the given build with `ddr_span` bytes of
    /// emulated weight memory.
    #[must_use]
    pub fn new(hw: HwBuild, ddr_span: usize) -> Self {
        Self {
            hw,
            weight_base: EMU_DDR_BASE,
            dim_m: 0,
            dim_k: 0,
            shift_amt: 0,
            status: 0,
            perf_cycles: 0,
            activations: vec![0; hw.max_dim_k],
            results: vec![0; hw.max_dim_m],
            hang_at: None,
            ddr: vec![0; ddr_span],
        }
    }

    /// Make any start pulse issued with `WEIGHT_BASE == addr` hang
    /// (DONE never sets), to exercise timeout handling.
    pub fn hang_at_weight_base(&mut self, addr: u32) {
        self.hang_at = Some(addr);
    }

    /// One accelerator invocation, triggered by a CTRL start pulse.
    fn execute(&mut self) {
        if self.hang_at == Some(self.weight_base) {
            debug!("oracle: hanging at weight base {:#x}", self.weight_base);
            self.status = status::BUSY;
            return;
        }

        // Like the PE array, ignore configuration beyond the build limits.
        let m = self.dim_m as usize;
        let k = (self.dim_k as usize).min(self.hw.max_dim_k);
        let base = self.weight_base.wrapping_sub(EMU_DDR_BASE) as usize;
        let tiles_per_row = self.hw.tiles_per_row(k);
        let row_stride = self.hw.row_stride(k);

        for row in 0..m.min(self.hw.max_dim_m) {
            let row_bytes = &self.ddr[(base + row * row_stride).min(self.ddr.len())..];
            let mut acc = 0i32;
            // The PE array walks every lane of every tile; columns past K
            // see the codec's zero padding.
            for col in 0..tiles_per_row * self.hw.lanes {
                let w = decode_lenient(row_bytes, 0, col, k, &self.hw);
                if w != 0 && col < k {
                    acc += i32::from(w) * i32::from(self.activations[col]);
                }
            }
            self.results[row] = match self.hw.result_mode {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                ResultMode::Shifted => {
                    let shifted = (acc >> self.shift_amt).clamp(-128, 127);
                    u32::from(shifted as i8 as u8)
                }
                #[allow(clippy::cast_sign_loss)]
                ResultMode::Raw => acc as u32,
            };
        }

        // Cycle model: one beat per tile per row plus pipeline fill.
        #[allow(clippy::cast_possible_truncation)]
        {
            self.perf_cycles = (m * tiles_per_row + 8) as u32;
        }
        self.status = status::DONE;
    }
}

impl AcceleratorBus for SoftwareDevice {
    fn hw(&self) -> &HwBuild {
        &self.hw
    }

    fn reg_read(&self, reg: Reg) -> Result<u32> {
        check_readable(reg)?;
        Ok(match reg.offset {
            o if o == regs::STATUS.offset => self.status,
            o if o == regs::WEIGHT_BASE.offset => self.weight_base,
            o if o == regs::DIM_M.offset => self.dim_m,
            o if o == regs::DIM_K.offset => self.dim_k,
            o if o == regs::SHIFT_AMT.offset => self.shift_amt,
            o if o == regs::PERF_CYCLES.offset => self.perf_cycles,
            _ => 0,
        })
    }

    fn reg_write(&mut self, reg: Reg, value: u32) -> Result<()> {
        check_writable(reg)?;
        match reg.offset {
            o if o == regs::CTRL.offset => {
                if value & ctrl::START != 0 {
                    self.execute();
                }
            }
            o if o == regs::WEIGHT_BASE.offset => self.weight_base = value,
            o if o == regs::DIM_M.offset => self.dim_m = value,
            o if o == regs::DIM_K.offset => self.dim_k = value,
            o if o == regs::SHIFT_AMT.offset => self.shift_amt = value,
            _ => {}
        }
        Ok(())
    }

    fn write_activation(&mut self, index: usize, value: i8) -> Result<()> {
        if index >= self.hw.max_dim_k {
            return Err(BitnetError::device_map(
                "oracle",
                format!("activation index {index} exceeds K limit {}", self.hw.max_dim_k),
            ));
        }
        self.activations[index] = value;
        Ok(())
    }

    fn read_result(&self, index: usize) -> Result<u32> {
        if index >= self.hw.max_dim_m {
            return Err(BitnetError::device_map(
                "oracle",
                format!("result index {index} exceeds M limit {}", self.hw.max_dim_m),
            ));
        }
        Ok(self.results[index])
    }

    fn load_weights(&mut self, offset: usize, data: &[u8]) -> Result<u32> {
        if offset.checked_add(data.len()).map_or(true, |end| end > self.ddr.len()) {
            return Err(BitnetError::WeightOverflow {
                payload: data.len(),
                span: self.ddr.len(),
                offset,
            });
        }
        self.ddr[offset..offset + data.len()].copy_from_slice(data);
        #[allow(clippy::cast_possible_truncation)]
        Ok(EMU_DDR_BASE + offset as u32)
    }

    fn weight_capacity(&self) -> usize {
        self.ddr.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pack_matrix;
    use bitnet_chip::regs::{CTRL, DIM_K, DIM_M, SHIFT_AMT, STATUS, WEIGHT_BASE};
    use std::time::Duration;

    fn run(dev: &mut SoftwareDevice, weights: &[i8], acts: &[i8], m: usize, k: usize, shift: u32) -> Vec<u32> {
        let hw = *dev.hw();
        let packed = pack_matrix(weights, m, k, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();
        for (i, &a) in acts.iter().enumerate() {
            dev.write_activation(i, a).unwrap();
        }
        dev.reg_write(WEIGHT_BASE, base).unwrap();
        dev.reg_write(DIM_M, m as u32).unwrap();
        dev.reg_write(DIM_K, k as u32).unwrap();
        dev.reg_write(SHIFT_AMT, shift).unwrap();
        dev.reg_write(CTRL, 1).unwrap();
        assert!(dev.wait_done(Duration::from_millis(10)).unwrap());
        (0..m).map(|i| dev.read_result(i).unwrap()).collect()
    }

    #[test]
    fn all_plus_one_weights() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        let out = run(&mut dev, &[1i8; 64], &[1i8; 64], 1, 64, 0);
        assert_eq!(out[0] as u8 as i8, 64);
    }

    #[test]
    fn shifted_mode_clamps_low_byte() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        // acc = 256 -> clamp 127
        let out = run(&mut dev, &[1i8; 64], &[4i8; 64], 1, 64, 0);
        assert_eq!(out[0] as u8 as i8, 127);
    }

    #[test]
    fn raw_mode_returns_full_accumulator() {
        let mut dev = SoftwareDevice::new(HwBuild::bitmamba(), 4096);
        // acc = 128 * 4 = 512: would clamp in shifted mode, survives raw
        let out = run(&mut dev, &[1i8; 128], &[4i8; 128], 1, 128, 0);
        assert_eq!(out[0] as i32, 512);
        // negative accumulator round-trips through the u32 register word
        let out = run(&mut dev, &[-1i8; 128], &[4i8; 128], 1, 128, 0);
        assert_eq!(out[0] as i32, -512);
    }

    #[test]
    fn activations_persist_across_pulses() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        let hw = *dev.hw();
        let packed = pack_matrix(&[1i8; 64], 1, 64, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();
        for i in 0..64 {
            dev.write_activation(i, 2).unwrap();
        }
        dev.reg_write(WEIGHT_BASE, base).unwrap();
        dev.reg_write(DIM_M, 1).unwrap();
        dev.reg_write(DIM_K, 64).unwrap();
        dev.reg_write(SHIFT_AMT, 1).unwrap();
        // two pulses without rewriting activations
        dev.reg_write(CTRL, 1).unwrap();
        let first = dev.read_result(0).unwrap();
        dev.reg_write(CTRL, 1).unwrap();
        let second = dev.read_result(0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first as u8 as i8, 64);
    }

    #[test]
    fn perf_cycles_scale_with_work() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 16 * 1024);
        run(&mut dev, &[1i8; 64], &[1i8; 64], 1, 64, 0);
        let small = dev.reg_read(bitnet_chip::regs::PERF_CYCLES).unwrap();
        run(&mut dev, &[1i8; 256], &[1i8; 256], 1, 256, 2);
        let large = dev.reg_read(bitnet_chip::regs::PERF_CYCLES).unwrap();
        assert!(small > 0);
        assert!(large > small);
    }

    #[test]
    fn hang_injection_never_sets_done() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        dev.hang_at_weight_base(EMU_DDR_BASE);
        dev.reg_write(WEIGHT_BASE, EMU_DDR_BASE).unwrap();
        dev.reg_write(DIM_M, 1).unwrap();
        dev.reg_write(DIM_K, 64).unwrap();
        dev.reg_write(CTRL, 1).unwrap();
        assert!(!dev.wait_done(Duration::from_millis(1)).unwrap());
        assert_eq!(dev.reg_read(STATUS).unwrap() & status::DONE, 0);
    }

    #[test]
    fn oversized_dim_k_is_truncated_not_fatal() {
        // DIM_K beyond the build limit: hardware reads only the lanes it
        // has; the oracle must complete the pulse the same way instead of
        // walking past its activation storage.
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 4096);
        let hw = *dev.hw();
        let packed = pack_matrix(&[1i8; 64], 1, 64, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();
        for i in 0..64 {
            dev.write_activation(i, 1).unwrap();
        }
        dev.reg_write(WEIGHT_BASE, base).unwrap();
        dev.reg_write(DIM_M, 1).unwrap();
        dev.reg_write(DIM_K, 2048).unwrap();
        dev.reg_write(SHIFT_AMT, 0).unwrap();
        dev.reg_write(CTRL, 1).unwrap();
        assert!(dev.wait_done(Duration::from_millis(10)).unwrap());
        assert_eq!(dev.read_result(0).unwrap() as u8 as i8, 64);
    }

    #[test]
    fn weight_file_loads_through_the_bus() {
        use std::io::Write as _;

        let hw = HwBuild::de10_rev_b();
        let packed = pack_matrix(&[1i8; 64], 1, 64, &hw).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&packed.data).unwrap();

        let mut dev = SoftwareDevice::new(hw, 4096);
        let base = dev.load_weights_file(file.path(), 0).unwrap();
        let out = {
            for i in 0..64 {
                dev.write_activation(i, 1).unwrap();
            }
            dev.reg_write(WEIGHT_BASE, base).unwrap();
            dev.reg_write(DIM_M, 1).unwrap();
            dev.reg_write(DIM_K, 64).unwrap();
            dev.reg_write(SHIFT_AMT, 0).unwrap();
            dev.reg_write(CTRL, 1).unwrap();
            dev.read_result(0).unwrap()
        };
        assert_eq!(out as u8 as i8, 64);

        let err = dev
            .load_weights_file(std::path::Path::new("/nonexistent/weights.bin"), 0)
            .unwrap_err();
        assert!(matches!(err, BitnetError::WeightFile { .. }));
    }

    #[test]
    fn write_only_register_rejects_read() {
        let dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64);
        assert!(matches!(
            dev.reg_read(CTRL).unwrap_err(),
            BitnetError::AccessViolation { .. }
        ));
    }

    #[test]
    fn weight_overflow_rejected() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64);
        let err = dev.load_weights(32, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, BitnetError::WeightOverflow { .. }));
    }
}
