#![forbid(unsafe_code)]

//! BitNet MLP model layer: weight bundles, device loading, the three-layer
//! inference pipeline, and image preprocessing.
//!
//! The shipped model is a BitNet b1.58 MLP classifier (784 -> 256 -> 128
//! -> 10). Weights are ternary; each layer runs as one accelerator matvec
//! with host-side ReLU between layers and arg-max at the end.
//!
//! # Example
//!
//! ```no_run
//! use bitnet_chip::HwBuild;
//! use bitnet_driver::SoftwareDevice;
//! use bitnet_models::{preprocess, LayerSpec, MlpWeights};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layers = [
//!     LayerSpec { m: 256, k: 784, shift: 7 },
//!     LayerSpec { m: 128, k: 256, shift: 6 },
//!     LayerSpec { m: 10, k: 128, shift: 5 },
//! ];
//! # let (w1, w2, w3) = (vec![0i8; 256*784], vec![0i8; 128*256], vec![0i8; 10*128]);
//! let mlp = MlpWeights::new(layers, [w1, w2, w3])?;
//!
//! let mut dev = SoftwareDevice::new(HwBuild::de10_rev_b(), 1 << 20);
//! let loaded = mlp.load_to_device(&mut dev)?;
//!
//! let image = preprocess("digit.pgm".as_ref())?;
//! let result = loaded.infer(&mut dev, &image.pixels)?;
//! println!("predicted {} ({} cycles L1)", result.digit, result.layer_cycles[0]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
mod model;
mod preprocess;

pub use error::{ModelError, Result};
pub use model::{
    argmax_i8, load_prepacked, relu_i8, Inference, LayerSpec, LoadedMlp, MlpWeights,
    MNIST_CLASSES, MNIST_LAYERS, MNIST_PIXELS,
};
pub use preprocess::{preprocess, Activations784};

/// Commonly used types.
pub mod prelude {
    pub use crate::{preprocess, Inference, LayerSpec, LoadedMlp, MlpWeights, ModelError, Result};
}
