//! A dilated U-Net for dense per-pixel prediction on square patches.
//!
//! Five pooling encoder stages feed a bottleneck, five decoder stages upsample, merge the
//! matching encoder output and refine it with dilated convolutions (rates 2, 2, 2, 3, 4 from
//! the deepest stage out), and a 1x1 projection ends in a sigmoid or softmax head.
//!
//! Tensors crossing the public boundary are channels-last: `(batch, patch, patch, channels)`.

pub mod config;
pub mod error;
pub mod model;
pub mod plan;

pub use config::{BlockActivation, DilatedUnetConfig, DECODER_DILATIONS, DEPTH, LEAKY_RELU_SLOPE};
pub use error::{Error, Result};
pub use model::{build, DilatedUnet, FeatureMaps, TrainableModel};
pub use plan::{ArchitecturePlan, FeatureShape, FinalActivation, Stage};
