//! Memory-mapped device session.
//!
//! A [`BitnetDevice`] owns the two physical mappings the driver needs —
//! the lightweight-bridge register window and the DDR3 weight region —
//! and releases both on drop, on every exit path. It is constructed once
//! and passed by reference to every component; there is no process-global
//! device state.

use crate::bus::{check_readable, check_writable, AcceleratorBus};
use crate::error::{BitnetError, Result};
use crate::mmio::MappedRegion;
use bitnet_chip::{build, HwBuild, Reg};

/// Physical layout the session maps.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Lightweight bridge physical base.
    pub bridge_base: u64,
    /// Lightweight bridge span in bytes.
    pub bridge_span: usize,
    /// Accelerator byte offset within the bridge window.
    pub accel_offset: usize,
    /// DDR3 weight region physical base.
    pub ddr_base: u64,
    /// DDR3 weight region span in bytes.
    pub ddr_span: usize,
    /// Hardware-build parameters.
    pub hw: HwBuild,
}

impl DeviceConfig {
    /// Platform defaults (DE10-Nano memory map) for a given build.
    #[must_use]
    pub const fn new(hw: HwBuild) -> Self {
        Self {
            bridge_base: build::LW_BRIDGE_BASE,
            bridge_span: build::LW_BRIDGE_SPAN,
            accel_offset: build::ACCEL_OFFSET,
            ddr_base: build::DDR3_BASE,
            ddr_span: build::DDR3_SPAN,
            hw,
        }
    }
}

/// Open session against the real accelerator.
#[derive(Debug)]
pub struct BitnetDevice {
    regs: MappedRegion,
    ddr: MappedRegion,
    accel_offset: usize,
    hw: HwBuild,
}

impl BitnetDevice {
    /// Map the register bank and weight region.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::DeviceMap`] if either mapping fails
    /// (fatal at startup; requires root for `/dev/mem`).
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let regs = MappedRegion::map(config.bridge_base, config.bridge_span, "lw-bridge")?;
        let ddr = MappedRegion::map(config.ddr_base, config.ddr_span, "ddr3-weights")?;
        tracing::info!(
            "Opened {} session: regs at {:#x}, weights at {:#x} ({} KB)",
            config.hw.name,
            config.bridge_base,
            config.ddr_base,
            config.ddr_span / 1024,
        );
        Ok(Self {
            regs,
            ddr,
            accel_offset: config.accel_offset,
            hw: config.hw,
        })
    }

    fn reg_offset(&self, reg: Reg) -> usize {
        self.accel_offset + reg.offset
    }
}

impl AcceleratorBus for BitnetDevice {
    fn hw(&self) -> &HwBuild {
        &self.hw
    }

    fn reg_read(&self, reg: Reg) -> Result<u32> {
        check_readable(reg)?;
        self.regs.read32(self.reg_offset(reg))
    }

    fn reg_write(&mut self, reg: Reg, value: u32) -> Result<()> {
        check_writable(reg)?;
        self.regs.write32(self.reg_offset(reg), value)
    }

    fn write_activation(&mut self, index: usize, value: i8) -> Result<()> {
        if index >= self.hw.max_dim_k {
            return Err(BitnetError::device_map(
                "lw-bridge",
                format!("activation index {index} exceeds K limit {}", self.hw.max_dim_k),
            ));
        }
        let offset = self.accel_offset + self.hw.act_base + index * 4;
        // Sign bits above bit 7 are ignored by the PEs.
        self.regs.write32(offset, u32::from(value as u8))
    }

    fn read_result(&self, index: usize) -> Result<u32> {
        if index >= self.hw.max_dim_m {
            return Err(BitnetError::device_map(
                "lw-bridge",
                format!("result index {index} exceeds M limit {}", self.hw.max_dim_m),
            ));
        }
        self.regs.read32(self.accel_offset + self.hw.result_base + index * 4)
    }

    fn load_weights(&mut self, offset: usize, data: &[u8]) -> Result<u32> {
        self.ddr.write_bytes(offset, data)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(self.ddr.phys_base() as u32 + offset as u32)
    }

    fn weight_capacity(&self) -> usize {
        self.ddr.size()
    }
}
