use thiserror::Error;

use crate::plan::Stage;

#[derive(Error, Debug)]
pub enum Error {
  /// A configuration value outside its domain
  #[error("invalid configuration: `{parameter}` {reason}")]
  InvalidConfiguration {
    parameter: &'static str,
    reason: String,
  },

  /// Incompatible tensor dimensions found while wiring the graph
  #[error("shape mismatch at {stage}: {detail}")]
  ShapeMismatch { stage: Stage, detail: String },

  #[error(transparent)]
  Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidConfiguration {
      parameter,
      reason: reason.into(),
    }
  }

  pub(crate) fn mismatch(stage: Stage, detail: impl Into<String>) -> Self {
    Self::ShapeMismatch {
      stage,
      detail: detail.into(),
    }
  }
}
