use dilated_unet::DilatedUnetConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::Cli;

pub fn setup_tracing(verbose: bool) {
  let subscriber = FmtSubscriber::builder()
    .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
    .with_target(false)
    .finish();

  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");
}

pub fn setup_config(args: &Cli) -> dilated_unet::Result<DilatedUnetConfig> {
  if args.smoke_batch.is_some() && args.dropout > 0. {
    tracing::warn!("Dropout is only active in training mode! The smoke pass ignores it...");
  }

  if args.smoke_batch == Some(0) {
    tracing::warn!("Smoke batch of size 0 requested, skipping the forward pass...");
  }

  let config = DilatedUnetConfig {
    dropout: args.dropout,
    filters: args.filters,
    batch_norm: !args.no_batch_norm,
    patch_size: args.patch_size,
    input_channels: args.input_channels,
    output_classes: args.output_classes,
    decoder_activation: args.activation,
  };

  config.validate()?;

  Ok(config)
}
