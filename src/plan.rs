//! Shape inference over the whole dilated U-Net topology.
//!
//! The plan is computed from a [`DilatedUnetConfig`] before any parameter is allocated, so a
//! malformed configuration fails with the stage and the dimensions involved instead of deep
//! inside a tensor kernel. The network itself is built from the channel counts recorded here.

use std::fmt;

use smallvec::SmallVec;

use crate::{
  config::{DilatedUnetConfig, DECODER_DILATIONS, DEPTH},
  error::{Error, Result},
};

/// Batch-agnostic shape of a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
  pub height: usize,
  pub width: usize,
  pub channels: usize,
}

impl FeatureShape {
  pub fn new(height: usize, width: usize, channels: usize) -> Self {
    Self {
      height,
      width,
      channels,
    }
  }

  /// Stride-1 same-padded convolution.
  pub fn conv(self, channels: usize) -> Self {
    Self { channels, ..self }
  }

  /// 2x2 max pooling, flooring odd sizes.
  pub fn max_pool(self, stage: Stage) -> Result<Self> {
    if self.height < 2 || self.width < 2 {
      return Err(Error::mismatch(
        stage,
        format!(
          "cannot pool a {}x{} feature map by 2 (patch size must be divisible by 32)",
          self.height, self.width
        ),
      ));
    }

    Ok(Self {
      height: self.height / 2,
      width: self.width / 2,
      ..self
    })
  }

  /// Nearest-neighbour upsampling by 2.
  pub fn upsample(self) -> Self {
    Self {
      height: self.height * 2,
      width: self.width * 2,
      ..self
    }
  }

  /// Channel-wise concatenation, spatial sizes must agree.
  pub fn concat(self, skip: Self, stage: Stage) -> Result<Self> {
    if (self.height, self.width) != (skip.height, skip.width) {
      return Err(Error::mismatch(
        stage,
        format!(
          "upsampled tensor is {}x{} but the skip connection is {}x{} \
           (patch size must be divisible by 32)",
          self.height, self.width, skip.height, skip.width
        ),
      ));
    }

    Ok(Self {
      channels: self.channels + skip.channels,
      ..self
    })
  }
}

impl fmt::Display for FeatureShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}x{}", self.height, self.width, self.channels)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Encoder(usize),
  Bottleneck,
  Decoder(usize),
  Projection,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Encoder(depth) => write!(f, "encoder depth {depth}"),
      Self::Bottleneck => f.write_str("bottleneck"),
      Self::Decoder(depth) => write!(f, "decoder depth {depth}"),
      Self::Projection => f.write_str("projection"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalActivation {
  /// Independent per-pixel probability, one output class
  Sigmoid,
  /// Per-pixel distribution over the channel axis
  Softmax,
}

impl FinalActivation {
  pub fn for_classes(output_classes: usize) -> Self {
    if output_classes == 1 {
      Self::Sigmoid
    } else {
      Self::Softmax
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderStage {
  pub depth: usize,
  pub input: FeatureShape,
  /// Output of the conv block, also the skip connection
  pub output: FeatureShape,
  pub pooled: FeatureShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BottleneckStage {
  pub input: FeatureShape,
  pub output: FeatureShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStage {
  pub depth: usize,
  pub dilation: usize,
  pub upsampled: FeatureShape,
  pub merged: FeatureShape,
  pub output: FeatureShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitecturePlan {
  pub input: FeatureShape,
  /// Shallowest stage first
  pub encoder: SmallVec<[EncoderStage; DEPTH]>,
  pub bottleneck: BottleneckStage,
  /// Deepest stage first, in execution order
  pub decoder: SmallVec<[DecoderStage; DEPTH]>,
  pub output: FeatureShape,
  pub final_activation: FinalActivation,
  pub batch_norm: bool,
}

impl ArchitecturePlan {
  pub fn new(config: &DilatedUnetConfig) -> Result<Self> {
    config.validate()?;

    let input = FeatureShape::new(config.patch_size, config.patch_size, config.input_channels);

    let mut encoder: SmallVec<[EncoderStage; DEPTH]> = SmallVec::new();
    let mut x = input;

    for depth in 0..DEPTH {
      let output = x.conv(config.stage_channels(depth));
      let pooled = output.max_pool(Stage::Encoder(depth))?;

      encoder.push(EncoderStage {
        depth,
        input: x,
        output,
        pooled,
      });

      x = pooled;
    }

    let bottleneck = BottleneckStage {
      input: x,
      output: x.conv(config.stage_channels(DEPTH)),
    };
    x = bottleneck.output;

    let mut decoder: SmallVec<[DecoderStage; DEPTH]> = SmallVec::new();

    for (depth, dilation) in (0..DEPTH).rev().zip(DECODER_DILATIONS) {
      let upsampled = x.upsample();
      let merged = upsampled.concat(encoder[depth].output, Stage::Decoder(depth))?;
      let output = merged.conv(config.stage_channels(depth));

      decoder.push(DecoderStage {
        depth,
        dilation,
        upsampled,
        merged,
        output,
      });

      x = output;
    }

    let output = x.conv(config.output_classes);

    if (output.height, output.width) != (input.height, input.width) {
      return Err(Error::mismatch(
        Stage::Projection,
        format!("output is {output} but the input is {input}"),
      ));
    }

    Ok(Self {
      input,
      encoder,
      bottleneck,
      decoder,
      output,
      final_activation: FinalActivation::for_classes(config.output_classes),
      batch_norm: config.batch_norm,
    })
  }

  /// Decoder dilation rates in execution order.
  pub fn decoder_dilations(&self) -> SmallVec<[usize; DEPTH]> {
    self.decoder.iter().map(|stage| stage.dilation).collect()
  }

  /// Number of scalars held by every weight, bias and normalization statistic.
  pub fn parameter_count(&self) -> usize {
    let block = |in_channels: usize, channels: usize| {
      let convs = 9 * in_channels * channels + channels + 9 * channels * channels + channels;
      // weight, bias, running mean and running variance after each conv
      let norms = if self.batch_norm { 2 * 4 * channels } else { 0 };
      convs + norms
    };

    let encoder: usize = self
      .encoder
      .iter()
      .map(|stage| block(stage.input.channels, stage.output.channels))
      .sum();

    let bottleneck = block(self.bottleneck.input.channels, self.bottleneck.output.channels);

    let decoder: usize = self
      .decoder
      .iter()
      .map(|stage| block(stage.merged.channels, stage.output.channels))
      .sum();

    let last = self.decoder.last().map_or(self.bottleneck.output, |s| s.output);
    let projection = last.channels * self.output.channels + self.output.channels;

    encoder + bottleneck + decoder + projection
  }
}

impl fmt::Display for ArchitecturePlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{:<18} {:<16} {}", "stage", "output", "dilation")?;
    writeln!(f, "{:<18} {:<16} -", "input", self.input.to_string())?;

    for stage in &self.encoder {
      let name = Stage::Encoder(stage.depth).to_string();
      writeln!(f, "{:<18} {:<16} 1", name, stage.output.to_string())?;
    }

    writeln!(f, "{:<18} {:<16} 1", "bottleneck", self.bottleneck.output.to_string())?;

    for stage in &self.decoder {
      let name = Stage::Decoder(stage.depth).to_string();
      writeln!(
        f,
        "{:<18} {:<16} {}",
        name,
        stage.output.to_string(),
        stage.dilation
      )?;
    }

    let head = match self.final_activation {
      FinalActivation::Sigmoid => "sigmoid",
      FinalActivation::Softmax => "softmax",
    };
    write!(f, "{:<18} {:<16} {head}", "projection", self.output.to_string())
  }
}
