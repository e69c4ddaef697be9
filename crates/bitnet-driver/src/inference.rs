//! BitLinear layer offload.
//!
//! A [`BitLinear`] describes one ternary layer already resident in the
//! weight region and runs it through the tiling engine in either numeric
//! domain: INT8 in / INT8 out on shifted builds (the integer MLP path),
//! or float in / float out on raw-accumulator builds (quantize on the way
//! in, dequantize on the way out, no requantization loss).
//!
//! At this layer a chunk timeout stops being a status and becomes an
//! error: a layer with zero-filled rows is a wrong answer, and callers
//! here want the inference aborted, not patched.

use crate::bus::AcceleratorBus;
use crate::error::{BitnetError, Result};
use crate::quant::{dequantize, quantize};
use crate::tiling::{MatvecOutcome, MatvecRequest, TilingEngine, CHUNK_TIMEOUT};

/// One ternary layer resident in the shared weight region.
#[derive(Debug, Clone)]
pub struct BitLinear {
    /// Output dimension.
    pub m: usize,
    /// Input dimension.
    pub k: usize,
    /// Requantization shift for shifted builds.
    pub shift: u32,
    /// Physical address of the packed weights.
    pub weight_base: u32,
    /// Byte stride between weight rows.
    pub row_stride: usize,
    /// Weight quantization scale from export (reciprocal mean-abs).
    pub weight_scale: f32,
    /// Per-element RMS norm weights (float path only), length K.
    pub norm_weight: Vec<f32>,
}

impl BitLinear {
    fn offload<B: AcceleratorBus + ?Sized>(&self, bus: &mut B, acts: &[i8]) -> Result<MatvecOutcome> {
        let req = MatvecRequest {
            m: self.m,
            k: self.k,
            shift: self.shift,
            weight_base: self.weight_base,
            row_stride: self.row_stride,
        };
        let out = TilingEngine::new(bus).run(acts, &req)?;
        if let Some(t) = out.timeouts.first() {
            return Err(BitnetError::Timeout {
                timeout_ms: CHUNK_TIMEOUT.as_millis().try_into().unwrap_or(u64::MAX),
                row_offset: t.row_offset,
                m: self.m,
                k: self.k,
            });
        }
        Ok(out)
    }

    /// INT8 -> INT8 forward pass (shifted builds).
    ///
    /// # Errors
    ///
    /// Timeouts, dimension mismatches, and wrong-build use all error.
    pub fn forward_i8<B: AcceleratorBus + ?Sized>(&self, bus: &mut B, acts: &[i8]) -> Result<Vec<i8>> {
        self.offload(bus, acts)?.as_i8()
    }

    /// Float -> float forward pass (raw-accumulator builds): quantize,
    /// offload, dequantize at full accumulator precision.
    ///
    /// # Errors
    ///
    /// Timeouts, dimension mismatches, and wrong-build use all error.
    pub fn forward_f32<B: AcceleratorBus + ?Sized>(&self, bus: &mut B, x: &[f32]) -> Result<Vec<f32>> {
        let q = quantize(x, &self.norm_weight);
        let raw = self.offload(bus, &q.values)?.as_raw()?;
        Ok(dequantize(&raw, q.scale, self.weight_scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pack_matrix;
    use crate::software::SoftwareDevice;
    use bitnet_chip::HwBuild;

    fn identity_layer(dev: &mut SoftwareDevice, k: usize) -> BitLinear {
        // M = K with a single +1 on the diagonal: acc_i = q_i.
        let hw = *dev.hw();
        let mut weights = vec![0i8; k * k];
        for i in 0..k {
            weights[i * k + i] = 1;
        }
        let packed = pack_matrix(&weights, k, k, &hw).unwrap();
        let base = dev.load_weights(0, &packed.data).unwrap();
        BitLinear {
            m: k,
            k,
            shift: 0,
            weight_base: base,
            row_stride: packed.row_stride,
            weight_scale: 1.0,
            norm_weight: vec![1.0; k],
        }
    }

    #[test]
    fn float_path_recovers_input_shape() {
        let mut dev = SoftwareDevice::new(HwBuild::bitmamba(), 256 * 1024);
        let k = 128;
        let mut layer = identity_layer(&mut dev, k);

        let x: Vec<f32> = (0..k).map(|i| ((i as f32) - 64.0) / 20.0).collect();
        // Fold the rms factor into weight_scale so the identity matvec
        // round-trips to the original values.
        let mean_sq = x.iter().map(|v| v * v).sum::<f32>() / k as f32;
        layer.weight_scale = 1.0 / (mean_sq + 1e-6).sqrt();

        let out = layer.forward_f32(&mut dev, &x).unwrap();
        assert_eq!(out.len(), k);
        for (a, b) in x.iter().zip(&out) {
            assert!((a - b).abs() <= a.abs().max(0.2) * (2.0 / 127.0), "{a} vs {b}");
        }
    }

    #[test]
    fn i8_path_on_raw_build_is_refused() {
        let mut dev = SoftwareDevice::new(HwBuild::bitmamba(), 256 * 1024);
        let layer = identity_layer(&mut dev, 128);
        let err = layer.forward_i8(&mut dev, &[1i8; 128]).unwrap_err();
        assert!(matches!(err, BitnetError::WrongResultMode { .. }));
    }

    #[test]
    fn timeout_is_fatal_with_context() {
        let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 64 * 1024);
        let layer = identity_layer(&mut dev, 64);
        dev.hang_at_weight_base(layer.weight_base);
        let err = layer.forward_i8(&mut dev, &[1i8; 64]).unwrap_err();
        match err {
            BitnetError::Timeout { row_offset, m, k, .. } => {
                assert_eq!(row_offset, 0);
                assert_eq!((m, k), (64, 64));
            }
            other => panic!("expected timeout, got {other}"),
        }
    }
}
