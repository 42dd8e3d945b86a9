mod cli;
mod setup;

use std::time::Instant;

use candle_core::{Device, Tensor};
use clap::Parser;
use dilated_unet::{DilatedUnetConfig, TrainableModel};

use crate::{
  cli::Cli,
  setup::{setup_config, setup_tracing},
};

fn main() {
  let args = Cli::parse();
  setup_tracing(args.verbose);

  if let Err(err) = run(&args) {
    tracing::error!("{err}");
    std::process::exit(1);
  }
}

fn run(args: &Cli) -> dilated_unet::Result<()> {
  let config = setup_config(args)?;

  let device = if args.use_cpu {
    Device::Cpu
  } else {
    Device::cuda_if_available(0)?
  };

  tracing::info!("Building the network on {device:?}");
  let model = dilated_unet::build(&config, &device)?;

  for line in model.network().plan().to_string().lines() {
    tracing::info!("{line}");
  }

  tracing::info!(
    "{} parameters in {} tensors",
    model.parameter_count(),
    model.vars().len()
  );

  if let Some(batch) = args.smoke_batch.filter(|&batch| batch > 0) {
    smoke_pass(&model, &config, batch, &device)?;
  }

  Ok(())
}

fn smoke_pass(
  model: &TrainableModel,
  config: &DilatedUnetConfig,
  batch: usize,
  device: &Device,
) -> dilated_unet::Result<()> {
  let shape = (batch, config.patch_size, config.patch_size, config.input_channels);
  let xs = Tensor::rand(0f32, 1f32, shape, device)?;

  let start = Instant::now();
  let ys = model.forward(&xs)?;
  let elapsed = start.elapsed();

  let flat = ys.flatten_all()?;
  let min = flat.min(0)?.to_scalar::<f32>()?;
  let max = flat.max(0)?.to_scalar::<f32>()?;

  tracing::info!(
    "Forward pass {:?} -> {:?}, values in [{min}, {max}], took {elapsed:.2?}",
    xs.dims(),
    ys.dims()
  );

  Ok(())
}
