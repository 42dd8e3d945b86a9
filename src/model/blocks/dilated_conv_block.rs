use candle_core::{ModuleT, Tensor};
use candle_nn::VarBuilder;

use super::{DoubleConv, SpatialDropout};
use crate::{config::BlockActivation, error};

/// [`super::ConvBlock`] with dilated convolutions and a selectable activation.
///
/// Padding equals the dilation rate, so the output keeps the spatial size of the input while
/// each convolution sees a `2 * dilation + 1` wide window.
pub struct DilatedConvBlock {
  inner: DoubleConv,
}

impl DilatedConvBlock {
  pub fn new(
    in_channels: usize,
    channels: usize,
    dilation: usize,
    dropout: f64,
    use_batch_norm: bool,
    activation: BlockActivation,
    vb: VarBuilder,
  ) -> error::Result<Self> {
    let inner = DoubleConv::new(
      in_channels,
      channels,
      dilation,
      dropout,
      use_batch_norm,
      activation,
      vb,
    )?;

    Ok(Self { inner })
  }

  pub fn channels(&self) -> usize {
    self.inner.channels()
  }

  pub fn dilation(&self) -> usize {
    self.inner.dilation()
  }

  pub fn activation(&self) -> BlockActivation {
    self.inner.activation
  }

  pub fn has_batch_norm(&self) -> bool {
    self.inner.bn1.is_some()
  }

  pub fn dropout(&self) -> Option<&SpatialDropout> {
    self.inner.dropout.as_ref()
  }
}

impl ModuleT for DilatedConvBlock {
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    self.inner.forward_t(xs, train)
  }
}
