mod blocks;
mod dilated_unet;

use candle_core::{DType, Device, ModuleT, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};

pub use blocks::*;
pub use dilated_unet::*;

use crate::{config::DilatedUnetConfig, error};

/// A wired [`DilatedUnet`] together with the [`VarMap`] owning every parameter, ready to be
/// handed to an optimizer or a checkpointing routine.
pub struct TrainableModel {
  network: DilatedUnet,
  varmap: VarMap,
}

/// Builds a freshly initialised network on `device`.
pub fn build(config: &DilatedUnetConfig, device: &Device) -> error::Result<TrainableModel> {
  let varmap = VarMap::new();
  let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
  let network = DilatedUnet::new(config, vb)?;

  Ok(TrainableModel { network, varmap })
}

impl TrainableModel {
  pub fn network(&self) -> &DilatedUnet {
    &self.network
  }

  pub fn varmap(&self) -> &VarMap {
    &self.varmap
  }

  /// Every variable, including normalization running statistics.
  pub fn vars(&self) -> Vec<Var> {
    self.varmap.all_vars()
  }

  pub fn parameter_names(&self) -> Vec<String> {
    let data = self.varmap.data().lock().unwrap_or_else(|e| e.into_inner());
    let mut names: Vec<_> = data.keys().cloned().collect();
    names.sort_unstable();
    names
  }

  pub fn parameter_count(&self) -> usize {
    self.vars().iter().map(|var| var.elem_count()).sum()
  }

  pub fn forward(&self, xs: &Tensor) -> Result<Tensor, candle_core::Error> {
    self.network.forward(xs)
  }
}

impl ModuleT for TrainableModel {
  fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor, candle_core::Error> {
    self.network.forward_t(xs, train)
  }
}
