use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{conv2d, ops, Conv2d, Conv2dConfig, VarBuilder};
use smallvec::SmallVec;

use super::blocks::{ConvBlock, DilatedConvBlock};
use crate::{
  config::{DilatedUnetConfig, DEPTH},
  error,
  plan::{ArchitecturePlan, FinalActivation},
};

/// Intermediate NCHW outputs of every stage.
pub struct FeatureMaps {
  /// Encoder outputs, shallowest first
  pub skips: SmallVec<[Tensor; DEPTH]>,
  pub bottleneck: Tensor,
  /// Decoder outputs, deepest first
  pub decoder: SmallVec<[Tensor; DEPTH]>,
}

pub struct DilatedUnet {
  encoder: Vec<ConvBlock>,
  bottleneck: ConvBlock,
  decoder: Vec<DilatedConvBlock>,
  projection: Conv2d,
  plan: ArchitecturePlan,
}

impl DilatedUnet {
  pub fn new(config: &DilatedUnetConfig, vb: VarBuilder) -> error::Result<Self> {
    let plan = ArchitecturePlan::new(config)?;

    let mut encoder = Vec::with_capacity(DEPTH);
    for stage in &plan.encoder {
      encoder.push(ConvBlock::new(
        stage.input.channels,
        stage.output.channels,
        config.dropout,
        config.batch_norm,
        vb.pp(format!("encoder.{}", stage.depth)),
      )?);
      tracing::debug!("encoder depth {}: {} -> {}", stage.depth, stage.input, stage.output);
    }

    let bottleneck = ConvBlock::new(
      plan.bottleneck.input.channels,
      plan.bottleneck.output.channels,
      config.dropout,
      config.batch_norm,
      vb.pp("bottleneck"),
    )?;
    tracing::debug!("bottleneck: {}", plan.bottleneck.output);

    let mut decoder = Vec::with_capacity(DEPTH);
    for stage in &plan.decoder {
      decoder.push(DilatedConvBlock::new(
        stage.merged.channels,
        stage.output.channels,
        stage.dilation,
        config.dropout,
        config.batch_norm,
        config.decoder_activation,
        vb.pp(format!("decoder.{}", stage.depth)),
      )?);
      tracing::debug!(
        "decoder depth {}: {} -> {} (dilation {})",
        stage.depth,
        stage.merged,
        stage.output,
        stage.dilation
      );
    }

    let projection = conv2d(
      plan.encoder[0].output.channels,
      plan.output.channels,
      1,
      Conv2dConfig::default(),
      vb.pp("projection"),
    )?;

    Ok(Self {
      encoder,
      bottleneck,
      decoder,
      projection,
      plan,
    })
  }

  pub fn plan(&self) -> &ArchitecturePlan {
    &self.plan
  }

  pub fn encoder(&self) -> &[ConvBlock] {
    &self.encoder
  }

  pub fn bottleneck(&self) -> &ConvBlock {
    &self.bottleneck
  }

  /// Decoder blocks in execution order, deepest first.
  pub fn decoder(&self) -> &[DilatedConvBlock] {
    &self.decoder
  }

  /// Runs every stage on an NCHW tensor and keeps the intermediate outputs.
  pub fn forward_features(
    &self,
    xs: &Tensor,
    train: bool,
  ) -> Result<FeatureMaps, candle_core::Error> {
    let mut skips = SmallVec::<[Tensor; DEPTH]>::new();
    let mut xs = xs.clone();

    for block in &self.encoder {
      let skip = block.forward_t(&xs, train)?;
      xs = skip.max_pool2d(2)?;
      skips.push(skip);
    }

    let bottleneck = self.bottleneck.forward_t(&xs, train)?;
    xs = bottleneck.clone();

    let mut decoder = SmallVec::<[Tensor; DEPTH]>::new();

    for (block, skip) in self.decoder.iter().zip(skips.iter().rev()) {
      let (_, _, h, w) = xs.dims4()?;
      let up = xs.upsample_nearest2d(h * 2, w * 2)?;
      xs = block.forward_t(&Tensor::cat(&[&up, skip], 1)?, train)?;
      decoder.push(xs.clone());
    }

    Ok(FeatureMaps {
      skips,
      bottleneck,
      decoder,
    })
  }

  /// Projection and final activation on the last decoder output.
  fn head(&self, xs: &Tensor) -> Result<Tensor, candle_core::Error> {
    let xs = self.projection.forward(xs)?;

    match self.plan.final_activation {
      FinalActivation::Sigmoid => ops::sigmoid(&xs),
      FinalActivation::Softmax => ops::softmax(&xs, 1),
    }
  }

  /// Inference pass: normalization uses running statistics and dropout is disabled.
  pub fn forward(&self, xs: &Tensor) -> Result<Tensor, candle_core::Error> {
    self.forward_t(xs, false)
  }
}

impl ModuleT for DilatedUnet {
  /// Maps `(batch, patch, patch, input_channels)` to `(batch, patch, patch, output_classes)`.
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    let (_, h, w, c) = xs.dims4()?;
    let input = self.plan.input;

    if (h, w, c) != (input.height, input.width, input.channels) {
      return Err(
        candle_core::Error::Msg(format!(
          "expected input of shape (batch, {}, {}, {}), got {:?}",
          input.height,
          input.width,
          input.channels,
          xs.dims()
        ))
        .bt(),
      );
    }

    let xs = xs.permute((0, 3, 1, 2))?.contiguous()?;
    let features = self.forward_features(&xs, train)?;

    let Some(last) = features.decoder.last() else {
      return Err(candle_core::Error::Msg("decoder produced no output".to_owned()).bt());
    };

    self.head(last)?.permute((0, 2, 3, 1))?.contiguous()
  }
}
