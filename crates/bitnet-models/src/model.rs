//! Three-layer ternary MLP pipeline.
//!
//! The classifier is a BitNet b1.58 MLP (784 -> 256 -> 128 -> 10 in the
//! shipped MNIST configuration): each layer is one accelerator matvec,
//! ReLU runs on the host between layers, arg-max picks the digit. The
//! accelerator keeps all three packed weight matrices resident in the
//! shared DDR3 region, placed sequentially at load time, so per-image
//! traffic is just activations in and ten logits out.

use crate::error::{ModelError, Result};
use bitnet_chip::regs::PERF_CYCLES;
use bitnet_driver::codec::pack_matrix;
use bitnet_driver::reference::expected_matvec;
use bitnet_driver::{AcceleratorBus, BitLinear};
use std::path::Path;
use tracing::{debug, info};

/// MNIST input size (28 x 28).
pub const MNIST_PIXELS: usize = 784;
/// MNIST output classes.
pub const MNIST_CLASSES: usize = 10;

/// Dimensions and requantization shift of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    /// Output dimension.
    pub m: usize,
    /// Input dimension.
    pub k: usize,
    /// Requantization shift.
    pub shift: u32,
}

/// The shipped MNIST topology. Shifts come from the model export and keep
/// each layer's activations inside INT8 without saturating ReLU inputs.
pub const MNIST_LAYERS: [LayerSpec; 3] = [
    LayerSpec { m: 256, k: 784, shift: 7 },
    LayerSpec { m: 128, k: 256, shift: 6 },
    LayerSpec { m: 10, k: 128, shift: 5 },
];

/// An unpacked ternary MLP: three row-major weight matrices plus their
/// layer specs.
#[derive(Debug, Clone)]
pub struct MlpWeights {
    layers: [LayerSpec; 3],
    data: [Vec<i8>; 3],
}

impl MlpWeights {
    /// Bundle three ternary matrices.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WeightBundle`] if a matrix's length disagrees
    /// with its spec, a value is outside {-1, 0, +1}, or consecutive
    /// layers do not chain (layer N's M must equal layer N+1's K).
    pub fn new(layers: [LayerSpec; 3], data: [Vec<i8>; 3]) -> Result<Self> {
        for (i, (spec, d)) in layers.iter().zip(&data).enumerate() {
            if d.len() != spec.m * spec.k {
                return Err(ModelError::weight_bundle(format!(
                    "layer {} has {} weights, spec {}x{} needs {}",
                    i + 1,
                    d.len(),
                    spec.m,
                    spec.k,
                    spec.m * spec.k
                )));
            }
            if let Some(bad) = d.iter().find(|w| !matches!(w, -1 | 0 | 1)) {
                return Err(ModelError::weight_bundle(format!(
                    "layer {} contains non-ternary weight {bad}",
                    i + 1
                )));
            }
        }
        for i in 0..2 {
            if layers[i].m != layers[i + 1].k {
                return Err(ModelError::weight_bundle(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i + 1,
                    layers[i].m,
                    i + 2,
                    layers[i + 1].k
                )));
            }
        }
        Ok(Self { layers, data })
    }

    /// Layer specs in pipeline order.
    #[must_use]
    pub fn layers(&self) -> &[LayerSpec; 3] {
        &self.layers
    }

    /// Pack each layer and place it in the device weight region,
    /// sequentially from offset 0.
    ///
    /// # Errors
    ///
    /// Codec failures and weight-region overflow propagate from the
    /// driver.
    pub fn load_to_device<B: AcceleratorBus + ?Sized>(&self, bus: &mut B) -> Result<LoadedMlp> {
        let hw = *bus.hw();
        let mut offset = 0usize;
        let mut loaded = Vec::with_capacity(3);

        for (spec, data) in self.layers.iter().zip(&self.data) {
            let packed = pack_matrix(data, spec.m, spec.k, &hw)?;
            let base = bus.load_weights(offset, &packed.data)?;
            debug!(
                "layer {}x{} packed to {} bytes at {base:#x}",
                spec.m,
                spec.k,
                packed.data.len()
            );
            loaded.push(BitLinear {
                m: spec.m,
                k: spec.k,
                shift: spec.shift,
                weight_base: base,
                row_stride: packed.row_stride,
                weight_scale: 1.0,
                norm_weight: Vec::new(),
            });
            offset += packed.data.len();
        }

        info!("{offset} weight bytes resident across 3 layers");
        let layers: [BitLinear; 3] = loaded
            .try_into()
            .map_err(|_| ModelError::weight_bundle("expected exactly 3 layers"))?;
        Ok(LoadedMlp { layers })
    }

    /// Run the full pipeline on the software reference model. This is the
    /// CPU parity path the benchmark compares hardware predictions against.
    ///
    /// # Panics
    ///
    /// Panics if `image` length disagrees with layer 1's K (caller
    /// contract, same as the device path's checked error).
    #[must_use]
    pub fn cpu_infer(&self, image: &[i8]) -> usize {
        assert_eq!(image.len(), self.layers[0].k, "input length mismatch");
        let mut acts = image.to_vec();
        for (i, (spec, data)) in self.layers.iter().zip(&self.data).enumerate() {
            let mut out = expected_matvec(data, &acts, spec.m, spec.k, spec.shift);
            if i < 2 {
                relu_i8(&mut out);
            }
            acts = out;
        }
        argmax_i8(&acts)
    }
}

/// Load a pre-packed weight blob (the device layout, produced offline)
/// and register its layers without re-encoding.
///
/// # Errors
///
/// I/O failures, a blob whose length disagrees with the layer specs, and
/// weight-region overflow all error.
pub fn load_prepacked<B: AcceleratorBus + ?Sized>(
    path: &Path,
    layers: [LayerSpec; 3],
    bus: &mut B,
) -> Result<LoadedMlp> {
    let blob = std::fs::read(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let hw = *bus.hw();
    let sizes: Vec<usize> = layers.iter().map(|s| s.m * hw.row_stride(s.k)).collect();
    let total: usize = sizes.iter().sum();
    if blob.len() != total {
        return Err(ModelError::weight_bundle(format!(
            "{} is {} bytes, layer specs need {total}",
            path.display(),
            blob.len()
        )));
    }

    let base = bus.load_weights(0, &blob)?;
    let mut offset = 0u32;
    let mut loaded = Vec::with_capacity(3);
    for (spec, size) in layers.iter().zip(&sizes) {
        loaded.push(BitLinear {
            m: spec.m,
            k: spec.k,
            shift: spec.shift,
            weight_base: base + offset,
            row_stride: hw.row_stride(spec.k),
            weight_scale: 1.0,
            norm_weight: Vec::new(),
        });
        #[allow(clippy::cast_possible_truncation)]
        {
            offset += *size as u32;
        }
    }
    let layers: [BitLinear; 3] = loaded
        .try_into()
        .map_err(|_| ModelError::weight_bundle("expected exactly 3 layers"))?;
    Ok(LoadedMlp { layers })
}

/// Result of one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
    /// Predicted class (arg-max over the final logits).
    pub digit: usize,
    /// PERF_CYCLES reading after each layer's final chunk.
    pub layer_cycles: [u32; 3],
}

/// An MLP resident in device memory, ready for repeated inference.
#[derive(Debug, Clone)]
pub struct LoadedMlp {
    layers: [BitLinear; 3],
}

impl LoadedMlp {
    /// Per-layer device placement.
    #[must_use]
    pub fn layers(&self) -> &[BitLinear; 3] {
        &self.layers
    }

    /// Classify one image: three matvecs with host-side ReLU between
    /// them, arg-max at the end.
    ///
    /// Any layer failure (timeout, register fault) aborts the inference;
    /// nothing here leaves half-written configuration behind, because the
    /// next call rewrites every register it depends on.
    ///
    /// # Errors
    ///
    /// Input length mismatch, chunk timeout, and bus faults all error.
    pub fn infer<B: AcceleratorBus + ?Sized>(&self, bus: &mut B, image: &[i8]) -> Result<Inference> {
        if image.len() != self.layers[0].k {
            return Err(ModelError::InputShape {
                got: image.len(),
                expected: self.layers[0].k,
            });
        }

        let mut acts = image.to_vec();
        let mut layer_cycles = [0u32; 3];
        for (i, layer) in self.layers.iter().enumerate() {
            let mut out = layer.forward_i8(bus, &acts)?;
            layer_cycles[i] = bus.reg_read(PERF_CYCLES)?;
            if i < 2 {
                relu_i8(&mut out);
            }
            acts = out;
        }

        Ok(Inference {
            digit: argmax_i8(&acts),
            layer_cycles,
        })
    }
}

/// Zero negative activations in place.
pub fn relu_i8(buf: &mut [i8]) {
    for v in buf {
        if *v < 0 {
            *v = 0;
        }
    }
}

/// Index of the first maximum element.
///
/// # Panics
///
/// Panics on an empty slice (caller contract: layer outputs always have
/// at least one row).
#[must_use]
pub fn argmax_i8(buf: &[i8]) -> usize {
    assert!(!buf.is_empty(), "argmax of an empty slice");
    let mut best = 0usize;
    for (i, &v) in buf.iter().enumerate() {
        if v > buf[best] {
            best = i;
        }
    }
    best
}
