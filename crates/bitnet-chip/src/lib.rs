//! Silicon model for the BitNet ternary matrix-vector accelerator.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the accelerator as seen from the HPS: the command register
//! map, status/control bit definitions, the 2-bit ternary weight encoding
//! parameters, and the per-build configuration (lane count, register array
//! bases, dimension limits) for the hardware revisions in circulation.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Command register map — offsets, access modes, bit definitions |
//! | [`build`] | Per-revision hardware parameters and memory-map constants |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod regs;

pub use build::{HwBuild, ResultMode};
pub use regs::{Access, Reg};
