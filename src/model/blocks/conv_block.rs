use candle_core::{ModuleT, Tensor};
use candle_nn::VarBuilder;

use super::DoubleConv;
use crate::{config::BlockActivation, error};

/// Two 3x3 same-padded convolutions with ReLU, optional batch norm and spatial dropout.
pub struct ConvBlock {
  inner: DoubleConv,
}

impl ConvBlock {
  pub fn new(
    in_channels: usize,
    channels: usize,
    dropout: f64,
    use_batch_norm: bool,
    vb: VarBuilder,
  ) -> error::Result<Self> {
    let inner = DoubleConv::new(
      in_channels,
      channels,
      1,
      dropout,
      use_batch_norm,
      BlockActivation::Relu,
      vb,
    )?;

    Ok(Self { inner })
  }

  pub fn channels(&self) -> usize {
    self.inner.channels()
  }

  pub fn has_batch_norm(&self) -> bool {
    self.inner.bn1.is_some()
  }

  pub fn dropout(&self) -> Option<&super::SpatialDropout> {
    self.inner.dropout.as_ref()
  }
}

impl ModuleT for ConvBlock {
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    self.inner.forward_t(xs, train)
  }
}
