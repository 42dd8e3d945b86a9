use clap::Parser;
use dilated_unet::BlockActivation;

#[derive(Parser)]
#[command(version, author)]
#[command(about = "Build and inspect a dilated U-Net", long_about = None)]
pub struct Cli {
  #[arg(short, long, help = "Side length of the square input, divisible by 32")]
  #[arg(value_name = "PATCH", default_value = "224")]
  pub patch_size: usize,

  #[arg(short, long, help = "Channel width of the outermost stage")]
  #[arg(value_name = "FILTERS", default_value = "32")]
  pub filters: usize,

  #[arg(short, long, help = "Spatial dropout probability after every block")]
  #[arg(value_name = "DROPOUT", default_value = "0.1")]
  pub dropout: f64,

  #[arg(long, help = "Build the blocks without batch normalization")]
  pub no_batch_norm: bool,

  #[arg(short, long, help = "Number of input channels")]
  #[arg(value_name = "CHANNELS", default_value = "3")]
  pub input_channels: usize,

  #[arg(
    short,
    long,
    help = "Number of output classes, 1 for a sigmoid head, more for softmax"
  )]
  #[arg(value_name = "CLASSES", default_value = "1")]
  pub output_classes: usize,

  #[arg(short, long, help = "Decoder activation (relu/leaky_relu)")]
  #[arg(value_name = "ACTIVATION", default_value = "relu", value_parser = parse_activation)]
  pub activation: BlockActivation,

  #[arg(
    short = 'b',
    long,
    help = "Run a forward pass on a random batch of this size"
  )]
  #[arg(value_name = "BATCH")]
  pub smoke_batch: Option<usize>,

  #[arg(short = 'C', long, help = "Use CPU instead of GPU")]
  pub use_cpu: bool,

  #[arg(short, long, help = "Log every built stage")]
  pub verbose: bool,
}

fn parse_activation(s: &str) -> Result<BlockActivation, String> {
  s.parse().map_err(|e: dilated_unet::Error| e.to_string())
}
