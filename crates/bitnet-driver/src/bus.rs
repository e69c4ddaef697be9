//! Accelerator bus abstraction.
//!
//! Everything above the register level — tiling, BitLinear layers, the
//! validation suite — talks to the accelerator through [`AcceleratorBus`],
//! so the same code drives the real memory-mapped hardware and the
//! bit-exact software oracle.

use crate::device::{BitnetDevice, DeviceConfig};
use crate::error::{BitnetError, Result};
use crate::software::SoftwareDevice;
use bitnet_chip::regs::{status, STATUS};
use bitnet_chip::{HwBuild, Reg};
use std::path::Path;
use std::time::{Duration, Instant};

/// Poll interval for [`AcceleratorBus::wait_done`] (matches the 10 µs
/// sleep the hardware bring-up used).
const POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Unified register-level interface to an accelerator instance.
pub trait AcceleratorBus {
    /// Hardware-build parameters this bus was opened with.
    fn hw(&self) -> &HwBuild;

    /// Read a named register.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::AccessViolation`] for write-only registers,
    /// or a device error on a failed access.
    fn reg_read(&self, reg: Reg) -> Result<u32>;

    /// Write a named register.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::AccessViolation`] for read-only registers,
    /// or a device error on a failed access.
    fn reg_write(&mut self, reg: Reg, value: u32) -> Result<()>;

    /// Write `activation[index]`. Activations persist in hardware-side
    /// storage across start pulses until overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside the activation array.
    fn write_activation(&mut self, index: usize, value: i8) -> Result<()>;

    /// Read `result[index]` as the raw 32-bit register word.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is outside the result array.
    fn read_result(&self, index: usize) -> Result<u32>;

    /// Copy packed weights into the shared region at `offset` and return
    /// the physical address the hardware must be pointed at.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::WeightOverflow`] if the payload does not fit.
    fn load_weights(&mut self, offset: usize, data: &[u8]) -> Result<u32>;

    /// Capacity of the shared weight region in bytes.
    fn weight_capacity(&self) -> usize;

    /// Load a pre-converted packed weight file into the region at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`BitnetError::WeightFile`] if the file cannot be read and
    /// [`BitnetError::WeightOverflow`] if its length exceeds the region.
    fn load_weights_file(&mut self, path: &Path, offset: usize) -> Result<u32> {
        let data = std::fs::read(path).map_err(|source| BitnetError::WeightFile {
            path: path.to_path_buf(),
            source,
        })?;
        let addr = self.load_weights(offset, &data)?;
        tracing::info!(
            "Loaded {} bytes of weights from {} at {addr:#x}",
            data.len(),
            path.display()
        );
        Ok(addr)
    }

    /// Poll STATUS until the DONE bit is set or `timeout` elapses.
    ///
    /// This is the sole blocking primitive in the driver. A timeout is a
    /// status, not a fault: the caller decides whether to zero-fill,
    /// retry, or abort.
    ///
    /// # Errors
    ///
    /// Propagates register-access errors; a timeout itself is `Ok(false)`.
    fn wait_done(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.reg_read(STATUS)? & status::DONE != 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Bus selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSelection {
    /// Try the memory-mapped hardware, fall back to the software oracle.
    Auto,
    /// Force the memory-mapped hardware device.
    Mmio,
    /// Force the software oracle (no hardware required).
    Software,
}

/// Open an accelerator bus per the selection strategy.
///
/// # Errors
///
/// Returns an error if the forced backend cannot be initialized; `Auto`
/// only fails if the software fallback does (it cannot).
pub fn open_bus(selection: BusSelection, config: &DeviceConfig) -> Result<Box<dyn AcceleratorBus>> {
    match selection {
        BusSelection::Auto => match BitnetDevice::open(config) {
            Ok(dev) => {
                tracing::info!("Using memory-mapped hardware ({})", config.hw.name);
                Ok(Box::new(dev))
            }
            Err(e) => {
                tracing::info!("Hardware unavailable ({e}); using software oracle");
                Ok(Box::new(SoftwareDevice::new(config.hw, config.ddr_span)))
            }
        },
        BusSelection::Mmio => BitnetDevice::open(config).map(|d| Box::new(d) as Box<dyn AcceleratorBus>),
        BusSelection::Software => Ok(Box::new(SoftwareDevice::new(config.hw, config.ddr_span))),
    }
}

pub(crate) fn check_readable(reg: Reg) -> Result<()> {
    if reg.readable() {
        Ok(())
    } else {
        Err(BitnetError::AccessViolation { op: "read", reg: reg.name })
    }
}

pub(crate) fn check_writable(reg: Reg) -> Result<()> {
    if reg.writable() {
        Ok(())
    } else {
        Err(BitnetError::AccessViolation { op: "write", reg: reg.name })
    }
}
