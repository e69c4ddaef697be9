//! Offload driver for the BitNet ternary matrix-vector FPGA accelerator.
//!
//! The accelerator implements one fixed primitive — a ternary-weight
//! matrix-vector multiply with INT8 activations — reachable through a small
//! memory-mapped register bank plus a shared DDR3 weight region. This crate
//! is the software side of that contract: the register protocol, the 2-bit
//! weight codec and tile layout, the M-dimension tiling engine, the
//! quantize/dequantize pipeline, and the bit-exact software reference model
//! used to validate hardware output.
//!
//! # Device hierarchy
//!
//! ```text
//! Hardware (requires root, /dev/mem):
//!   BitnetDevice   — mmap'd lightweight bridge + DDR3 weight region
//!
//! Oracle (no hardware required):
//!   SoftwareDevice — bit-exact register-protocol emulation; CI baseline
//!                    and ground truth for hardware validation
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use bitnet_chip::HwBuild;
//! use bitnet_driver::{AcceleratorBus, BitnetDevice, DeviceConfig, MatvecRequest, TilingEngine};
//!
//! # fn main() -> bitnet_driver::Result<()> {
//! let mut dev = BitnetDevice::open(&DeviceConfig::new(HwBuild::de10_rev_b()))?;
//!
//! let packed = bitnet_driver::codec::pack_matrix(&[1i8; 256 * 64], 256, 64, dev.hw())?;
//! let base = dev.load_weights(0, &packed.data)?;
//!
//! let acts = [1i8; 64];
//! let req = MatvecRequest { m: 256, k: 64, shift: 0, weight_base: base, row_stride: packed.row_stride };
//! let out = TilingEngine::new(&mut dev).run(&acts, &req)?;
//! let results = out.as_i8()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod bus;
pub mod codec;
mod device;
mod error;
pub mod inference;
mod mmio;
pub mod quant;
pub mod reference;
mod software;
pub mod tiling;
pub mod validate;

pub use bus::{open_bus, AcceleratorBus, BusSelection};
pub use codec::PackedMatrix;
pub use device::{BitnetDevice, DeviceConfig};
pub use error::{BitnetError, Result};
pub use inference::BitLinear;
pub use quant::QuantizedActivations;
pub use software::SoftwareDevice;
pub use tiling::{ChunkTimeout, MatvecOutcome, MatvecRequest, TilingEngine};
pub use validate::{run_suite, ValidationReport};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        open_bus, AcceleratorBus, BitLinear, BitnetDevice, BitnetError, BusSelection,
        DeviceConfig, MatvecOutcome, MatvecRequest, PackedMatrix, QuantizedActivations, Result,
        SoftwareDevice, TilingEngine,
    };
    pub use bitnet_chip::{HwBuild, ResultMode};
}
