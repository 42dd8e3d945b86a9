use candle_core::{DType, ModuleT, Tensor};

use crate::error::{self, Error};

/// Dropout over whole feature-map channels of an NCHW tensor.
///
/// Inactive outside training. Surviving channels are rescaled by `1 / (1 - p)` so the
/// expected activation is unchanged.
#[derive(Debug, Clone, Copy)]
pub struct SpatialDropout {
  drop_p: f64,
}

impl SpatialDropout {
  pub fn new(drop_p: f64) -> error::Result<Self> {
    if !drop_p.is_finite() || !(0.0..1.0).contains(&drop_p) {
      return Err(Error::invalid(
        "dropout",
        format!("must lie in [0, 1), got {drop_p}"),
      ));
    }

    Ok(Self { drop_p })
  }

  pub fn probability(&self) -> f64 {
    self.drop_p
  }
}

impl ModuleT for SpatialDropout {
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    if !train || self.drop_p == 0. {
      return Ok(xs.clone());
    }

    let (n, c, _, _) = xs.dims4()?;

    let keep = Tensor::rand(0f32, 1f32, (n, c, 1, 1), xs.device())?
      .ge(self.drop_p as f32)?
      .to_dtype(DType::F32)?;
    let mask = (keep * (1. / (1. - self.drop_p)))?.to_dtype(xs.dtype())?;

    xs.broadcast_mul(&mask)
  }
}
