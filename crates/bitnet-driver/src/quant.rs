//! Quantization pipeline bridging float model math to the fixed-point PEs.
//!
//! Forward path: RMS-normalize against per-element learned weights, scale
//! so the largest magnitude maps to 127, round and clamp to INT8. The
//! scale travels with the vector — raw accumulators read back from the
//! hardware are only meaningful divided by `scale_x * scale_w`.
//!
//! Inverse path: plain division, no shift, no clamp. Raw-accumulator
//! builds lose nothing to requantization, which is the whole point of
//! reading the accumulator unshifted.

/// Guards the RMS against an all-zero input vector.
const RMS_EPS: f32 = 1e-6;
/// Guards the scale against an all-zero normalized vector.
const SCALE_EPS: f32 = 1e-5;

/// An INT8 activation vector plus the scale that produced it.
#[derive(Debug, Clone)]
pub struct QuantizedActivations {
    /// Quantized values in [-128, 127].
    pub values: Vec<i8>,
    /// `127 / max|normalized|`; required for dequantization.
    pub scale: f32,
}

/// RMS-normalize `x` against `norm_weight` and quantize to INT8.
///
/// # Panics
///
/// Panics if `x` and `norm_weight` differ in length (caller contract:
/// both are the layer's K dimension).
#[must_use]
pub fn quantize(x: &[f32], norm_weight: &[f32]) -> QuantizedActivations {
    assert_eq!(x.len(), norm_weight.len(), "norm weight length must match input");

    #[allow(clippy::cast_precision_loss)]
    let mean_sq = x.iter().map(|v| v * v).sum::<f32>() / x.len().max(1) as f32;
    let rms = 1.0 / (mean_sq + RMS_EPS).sqrt();

    let normalized: Vec<f32> = x
        .iter()
        .zip(norm_weight)
        .map(|(v, w)| v * rms * w)
        .collect();

    let max_abs = normalized.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let scale = 127.0 / (max_abs + SCALE_EPS);

    #[allow(clippy::cast_possible_truncation)]
    let values = normalized
        .iter()
        .map(|v| (v * scale).round().clamp(-128.0, 127.0) as i8)
        .collect();

    QuantizedActivations { values, scale }
}

/// Convert raw accumulators back to floats: `acc / (scale_x * scale_w)`.
///
/// `scale_w` is the weight quantization scale baked in at export time
/// (reciprocal of the mean absolute full-precision weight).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn dequantize(acc: &[i32], scale_x: f32, scale_w: f32) -> Vec<f32> {
    let inv = 1.0 / (scale_x * scale_w);
    acc.iter().map(|&a| a as f32 * inv).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_magnitude_maps_to_127() {
        let x = [0.5f32, -2.0, 1.0, 0.0];
        let w = [1.0f32; 4];
        let q = quantize(&x, &w);
        assert_eq!(q.values.iter().map(|v| v.abs()).max().unwrap(), 127);
        // The -2.0 element is the largest magnitude
        assert_eq!(q.values[1], -127);
    }

    #[test]
    fn all_zero_input_does_not_divide_by_zero() {
        let x = [0.0f32; 8];
        let w = [1.0f32; 8];
        let q = quantize(&x, &w);
        assert!(q.values.iter().all(|&v| v == 0));
        assert!(q.scale.is_finite());
    }

    #[test]
    fn norm_weight_scales_per_element() {
        // Doubling one norm weight makes that element dominate.
        let x = [1.0f32, 1.0];
        let q = quantize(&x, &[1.0, 2.0]);
        assert_eq!(q.values[1], 127);
        assert!((q.values[0] - 64).abs() <= 1);
    }

    #[test]
    fn quantize_dequantize_round_trip() {
        // Identity accumulator: acc_i = q_i (one +1 weight per row). The
        // round trip must recover x up to ~1/127 relative error after the
        // shared rms*w factor is divided out via scale_w.
        let x: Vec<f32> = (0..64).map(|i| (i as f32 - 31.5) / 10.0).collect();
        let w = vec![1.0f32; 64];
        let q = quantize(&x, &w);

        let acc: Vec<i32> = q.values.iter().map(|&v| i32::from(v)).collect();
        // The quantizer folded rms into each element; undo it through scale_w.
        let mean_sq = x.iter().map(|v| v * v).sum::<f32>() / 64.0;
        let rms = 1.0 / (mean_sq + 1e-6).sqrt();
        let out = dequantize(&acc, q.scale, rms);

        for (orig, recovered) in x.iter().zip(&out) {
            let tol = orig.abs().max(0.1) * (2.0 / 127.0);
            assert!(
                (orig - recovered).abs() <= tol,
                "{orig} vs {recovered} (tol {tol})"
            );
        }
    }

    #[test]
    fn dequantize_preserves_sign_and_ratio() {
        let out = dequantize(&[254, -127, 0], 127.0, 2.0);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] + 0.5).abs() < 1e-6);
        assert_eq!(out[2], 0.0);
    }
}
