use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Number of pooling stages between the input and the bottleneck.
pub const DEPTH: usize = 5;

/// Decoder dilation rates, deepest stage first.
pub const DECODER_DILATIONS: [usize; DEPTH] = [2, 2, 2, 3, 4];

/// Negative slope of [`BlockActivation::LeakyRelu`].
pub const LEAKY_RELU_SLOPE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockActivation {
  #[default]
  Relu,
  LeakyRelu,
}

impl BlockActivation {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Relu => "relu",
      Self::LeakyRelu => "leaky_relu",
    }
  }
}

impl From<BlockActivation> for candle_nn::Activation {
  fn from(value: BlockActivation) -> Self {
    match value {
      BlockActivation::Relu => candle_nn::Activation::Relu,
      BlockActivation::LeakyRelu => candle_nn::Activation::LeakyRelu(LEAKY_RELU_SLOPE),
    }
  }
}

impl fmt::Display for BlockActivation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BlockActivation {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "relu" => Ok(Self::Relu),
      "leaky_relu" | "leaky-relu" => Ok(Self::LeakyRelu),
      other => Err(Error::invalid(
        "activation",
        format!("must be `relu` or `leaky_relu`, got `{other}`"),
      )),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DilatedUnetConfig {
  /// Spatial dropout probability applied after every block
  pub dropout: f64,
  /// Channel width of the outermost stage, doubled at every depth
  pub filters: usize,
  pub batch_norm: bool,
  /// Side length of the square input, must be divisible by 32
  pub patch_size: usize,
  pub input_channels: usize,
  /// 1 selects a sigmoid head, anything larger a softmax head
  pub output_classes: usize,
  pub decoder_activation: BlockActivation,
}

impl Default for DilatedUnetConfig {
  fn default() -> Self {
    Self {
      dropout: 0.1,
      filters: 32,
      batch_norm: true,
      patch_size: 224,
      input_channels: 3,
      output_classes: 1,
      decoder_activation: BlockActivation::Relu,
    }
  }
}

impl DilatedUnetConfig {
  /// Checks every value against its domain. Divisibility of `patch_size` is left to the
  /// shape plan, which reports the offending stage.
  pub fn validate(&self) -> Result<()> {
    if !self.dropout.is_finite() || !(0.0..1.0).contains(&self.dropout) {
      return Err(Error::invalid(
        "dropout",
        format!("must lie in [0, 1), got {}", self.dropout),
      ));
    }

    for (parameter, value) in [
      ("filters", self.filters),
      ("patch_size", self.patch_size),
      ("input_channels", self.input_channels),
      ("output_classes", self.output_classes),
    ] {
      if value == 0 {
        return Err(Error::invalid(parameter, "must be positive"));
      }
    }

    Ok(())
  }

  /// Channel count of the encoder and decoder stages at `depth`.
  pub fn stage_channels(&self, depth: usize) -> usize {
    self.filters << depth
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = DilatedUnetConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.patch_size, 224);
    assert_eq!(config.filters, 32);
    assert_eq!(config.output_classes, 1);
  }

  #[test]
  fn rejects_out_of_domain_values() {
    let cases = [
      DilatedUnetConfig {
        dropout: 1.,
        ..Default::default()
      },
      DilatedUnetConfig {
        dropout: -0.1,
        ..Default::default()
      },
      DilatedUnetConfig {
        dropout: f64::NAN,
        ..Default::default()
      },
      DilatedUnetConfig {
        filters: 0,
        ..Default::default()
      },
      DilatedUnetConfig {
        input_channels: 0,
        ..Default::default()
      },
      DilatedUnetConfig {
        output_classes: 0,
        ..Default::default()
      },
    ];

    for config in cases {
      assert!(
        matches!(config.validate(), Err(Error::InvalidConfiguration { .. })),
        "{config:?} should be rejected"
      );
    }
  }

  #[test]
  fn stage_channels_double_per_depth() {
    let config = DilatedUnetConfig {
      filters: 16,
      ..Default::default()
    };
    let channels: Vec<_> = (0..=DEPTH).map(|d| config.stage_channels(d)).collect();
    assert_eq!(channels, [16, 32, 64, 128, 256, 512]);
  }

  #[test]
  fn parses_activation_names() {
    assert_eq!("relu".parse::<BlockActivation>().ok(), Some(BlockActivation::Relu));
    assert_eq!(
      "leaky_relu".parse::<BlockActivation>().ok(),
      Some(BlockActivation::LeakyRelu)
    );
    assert!("tanh".parse::<BlockActivation>().is_err());
  }
}
