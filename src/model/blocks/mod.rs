mod conv_block;
mod dilated_conv_block;
mod spatial_dropout;

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{
  batch_norm, conv2d, Activation, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder,
};

use crate::{
  config::BlockActivation,
  error::{self, Error},
};

pub use conv_block::*;
pub use dilated_conv_block::*;
pub use spatial_dropout::*;

/// Momentum and epsilon of the usual segmentation setups, candle counts momentum as the
/// weight of the new batch statistics.
const NORM_CONFIG: BatchNormConfig = BatchNormConfig {
  eps: 1e-3,
  remove_mean: true,
  affine: true,
  momentum: 0.01,
};

/// `conv -> [bn] -> act -> conv -> [bn] -> act -> [spatial dropout]`, shared by both blocks.
struct DoubleConv {
  conv1: Conv2d,
  bn1: Option<BatchNorm>,
  conv2: Conv2d,
  bn2: Option<BatchNorm>,
  activation: BlockActivation,
  dropout: Option<SpatialDropout>,
}

impl DoubleConv {
  fn new(
    in_channels: usize,
    channels: usize,
    dilation: usize,
    dropout: f64,
    use_batch_norm: bool,
    activation: BlockActivation,
    vb: VarBuilder,
  ) -> error::Result<Self> {
    if in_channels == 0 || channels == 0 {
      return Err(Error::invalid("channels", "must be positive"));
    }
    if dilation == 0 {
      return Err(Error::invalid("dilation", "must be at least 1"));
    }

    // same padding for a 3x3 kernel
    let conf = Conv2dConfig {
      padding: dilation,
      dilation,
      ..Default::default()
    };

    let conv1 = conv2d(in_channels, channels, 3, conf, vb.pp("conv1"))?;
    let conv2 = conv2d(channels, channels, 3, conf, vb.pp("conv2"))?;

    let (bn1, bn2) = if use_batch_norm {
      (
        Some(batch_norm(channels, NORM_CONFIG, vb.pp("bn1"))?),
        Some(batch_norm(channels, NORM_CONFIG, vb.pp("bn2"))?),
      )
    } else {
      (None, None)
    };

    let dropout = SpatialDropout::new(dropout)?;
    let dropout = (dropout.probability() > 0.).then_some(dropout);

    Ok(Self {
      conv1,
      bn1,
      conv2,
      bn2,
      activation,
      dropout,
    })
  }

  fn channels(&self) -> usize {
    self.conv2.weight().dims()[0]
  }

  fn dilation(&self) -> usize {
    self.conv1.config().dilation
  }
}

impl ModuleT for DoubleConv {
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    let activation = Activation::from(self.activation);

    let mut xs = self.conv1.forward(xs)?;
    if let Some(bn) = &self.bn1 {
      xs = bn.forward_t(&xs, train)?;
    }
    xs = activation.forward(&xs)?;

    xs = self.conv2.forward(&xs)?;
    if let Some(bn) = &self.bn2 {
      xs = bn.forward_t(&xs, train)?;
    }
    xs = activation.forward(&xs)?;

    if let Some(dropout) = &self.dropout {
      xs = dropout.forward_t(&xs, train)?;
    }

    Ok(xs)
  }
}
