use candle_core::{DType, Device, ModuleT, Tensor};
use candle_nn::VarBuilder;
use dilated_unet::{
  build, BlockActivation, DilatedUnet, DilatedUnetConfig, Error, FinalActivation, Stage,
};

fn small_config(patch_size: usize, filters: usize, output_classes: usize) -> DilatedUnetConfig {
  DilatedUnetConfig {
    patch_size,
    filters,
    output_classes,
    ..Default::default()
  }
}

fn random_input(batch: usize, config: &DilatedUnetConfig) -> candle_core::Result<Tensor> {
  Tensor::rand(
    0f32,
    1f32,
    (batch, config.patch_size, config.patch_size, config.input_channels),
    &Device::Cpu,
  )
}

fn bounds(xs: &Tensor) -> candle_core::Result<(f32, f32)> {
  let flat = xs.flatten_all()?;
  Ok((
    flat.min(0)?.to_scalar::<f32>()?,
    flat.max(0)?.to_scalar::<f32>()?,
  ))
}

#[test]
fn output_shape_follows_config() -> dilated_unet::Result<()> {
  for output_classes in [1, 3] {
    let config = small_config(32, 2, output_classes);
    let model = build(&config, &Device::Cpu)?;

    let ys = model.forward(&random_input(2, &config)?)?;
    assert_eq!(ys.dims(), &[2, 32, 32, output_classes]);

    let ys = model.forward_t(&random_input(3, &config)?, true)?;
    assert_eq!(ys.dims(), &[3, 32, 32, output_classes]);
  }
  Ok(())
}

#[test]
fn patch_size_must_be_divisible_by_32() -> dilated_unet::Result<()> {
  let err = build(&small_config(100, 32, 1), &Device::Cpu).err();
  assert!(
    matches!(
      err,
      Some(Error::ShapeMismatch {
        stage: Stage::Decoder(2),
        ..
      })
    ),
    "{err:?}"
  );

  build(&small_config(224, 1, 1), &Device::Cpu)?;
  Ok(())
}

#[test]
fn invalid_configuration_is_reported() {
  let config = DilatedUnetConfig {
    dropout: 1.,
    ..small_config(32, 2, 1)
  };
  assert!(matches!(
    build(&config, &Device::Cpu),
    Err(Error::InvalidConfiguration {
      parameter: "dropout",
      ..
    })
  ));
}

#[test]
fn stage_tensors_match_the_plan() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig {
    input_channels: 1,
    ..small_config(64, 3, 1)
  };
  let model = build(&config, &Device::Cpu)?;
  let network = model.network();

  let xs = Tensor::rand(0f32, 1f32, (1, 1, 64, 64), &Device::Cpu)?;
  let features = network.forward_features(&xs, false)?;

  assert_eq!(features.skips.len(), 5);
  for (depth, skip) in features.skips.iter().enumerate() {
    assert_eq!(skip.dims(), &[1, 3 << depth, 64 >> depth, 64 >> depth]);
    assert_eq!(network.encoder()[depth].channels(), 3 << depth);
  }

  assert_eq!(features.bottleneck.dims(), &[1, 3 * 32, 2, 2]);
  assert_eq!(network.bottleneck().channels(), 3 * 32);

  let plan = network.plan();
  for (stage, output) in plan.decoder.iter().zip(&features.decoder) {
    let shape = stage.output;
    assert_eq!(output.dims(), &[1, shape.channels, shape.height, shape.width]);
  }
  Ok(())
}

#[test]
fn decoder_dilations_are_fixed() -> dilated_unet::Result<()> {
  for (patch_size, filters) in [(32, 1), (64, 4), (96, 2)] {
    let model = build(&small_config(patch_size, filters, 1), &Device::Cpu)?;
    let dilations: Vec<_> = model
      .network()
      .decoder()
      .iter()
      .map(|block| block.dilation())
      .collect();
    assert_eq!(dilations, [2, 2, 2, 3, 4]);
  }
  Ok(())
}

#[test]
fn sigmoid_head_for_one_class() -> dilated_unet::Result<()> {
  let config = small_config(32, 2, 1);
  let model = build(&config, &Device::Cpu)?;
  assert_eq!(model.network().plan().final_activation, FinalActivation::Sigmoid);

  let (min, max) = bounds(&model.forward(&random_input(2, &config)?)?)?;
  assert!(min > 0. && max < 1., "[{min}, {max}]");
  Ok(())
}

#[test]
fn softmax_head_sums_to_one() -> dilated_unet::Result<()> {
  let config = small_config(32, 2, 4);
  let model = build(&config, &Device::Cpu)?;
  assert_eq!(model.network().plan().final_activation, FinalActivation::Softmax);

  let ys = model.forward(&random_input(2, &config)?)?;
  let (min, max) = bounds(&(ys.sum(3)? - 1.)?)?;
  assert!(min.abs() < 1e-5 && max.abs() < 1e-5, "[{min}, {max}]");
  Ok(())
}

#[test]
fn disabling_batch_norm_removes_statistics() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig {
    batch_norm: false,
    ..small_config(32, 2, 1)
  };
  let model = build(&config, &Device::Cpu)?;

  let names = model.parameter_names();
  assert!(!names.is_empty());
  assert!(names.iter().all(|name| !name.contains(".bn")), "{names:?}");
  assert!(names.iter().all(|name| !name.contains("running_")));

  let network = model.network();
  assert!(network.encoder().iter().all(|block| !block.has_batch_norm()));
  assert!(network.decoder().iter().all(|block| !block.has_batch_norm()));

  let ys = model.forward(&random_input(1, &config)?)?;
  assert_eq!(ys.dims(), &[1, 32, 32, 1]);

  let with_bn = build(&small_config(32, 2, 1), &Device::Cpu)?;
  assert!(with_bn
    .parameter_names()
    .iter()
    .any(|name| name == "encoder.0.bn1.running_mean"));
  Ok(())
}

#[test]
fn parameter_count_matches_the_plan() -> dilated_unet::Result<()> {
  for batch_norm in [true, false] {
    let config = DilatedUnetConfig {
      batch_norm,
      ..small_config(32, 3, 2)
    };
    let model = build(&config, &Device::Cpu)?;
    assert_eq!(
      model.parameter_count(),
      model.network().plan().parameter_count()
    );
  }
  Ok(())
}

#[test]
fn zero_dropout_is_deterministic() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig {
    dropout: 0.,
    ..small_config(32, 2, 1)
  };
  let model = build(&config, &Device::Cpu)?;
  let network = model.network();

  assert!(network.encoder().iter().all(|block| block.dropout().is_none()));
  assert!(network.bottleneck().dropout().is_none());
  assert!(network.decoder().iter().all(|block| block.dropout().is_none()));

  // a second build over the same variables shares every weight
  let vb = VarBuilder::from_varmap(model.varmap(), DType::F32, &Device::Cpu);
  let twin = DilatedUnet::new(&config, vb)?;

  let xs = random_input(2, &config)?;
  let a = model.forward_t(&xs, true)?;
  let b = model.forward_t(&xs, true)?;
  let c = twin.forward_t(&xs, true)?;

  let (min, max) = bounds(&(&a - &b)?.abs()?)?;
  assert_eq!((min, max), (0., 0.));
  let (min, max) = bounds(&(&a - &c)?.abs()?)?;
  assert_eq!((min, max), (0., 0.));
  Ok(())
}

#[test]
fn dropout_is_kept_when_requested() -> dilated_unet::Result<()> {
  let model = build(&small_config(32, 2, 1), &Device::Cpu)?;
  let network = model.network();

  for block in network.encoder() {
    let dropout = block.dropout().map(|d| d.probability());
    assert_eq!(dropout, Some(0.1));
  }
  Ok(())
}

#[test]
fn decoder_activation_is_configurable() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig {
    decoder_activation: BlockActivation::LeakyRelu,
    ..small_config(32, 2, 1)
  };
  let model = build(&config, &Device::Cpu)?;

  assert!(model
    .network()
    .decoder()
    .iter()
    .all(|block| block.activation() == BlockActivation::LeakyRelu));

  let ys = model.forward(&random_input(1, &config)?)?;
  assert_eq!(ys.dims(), &[1, 32, 32, 1]);
  Ok(())
}

#[test]
fn rejects_inputs_of_the_wrong_shape() -> dilated_unet::Result<()> {
  let config = small_config(32, 2, 1);
  let model = build(&config, &Device::Cpu)?;

  // channels-first instead of channels-last
  let xs = Tensor::rand(0f32, 1f32, (1, 3, 32, 32), &Device::Cpu)?;
  assert!(model.forward(&xs).is_err());
  Ok(())
}

#[test]
fn gradients_reach_every_stage() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig {
    dropout: 0.,
    ..small_config(32, 2, 1)
  };
  let model = build(&config, &Device::Cpu)?;

  let ys = model.forward_t(&random_input(2, &config)?, true)?;
  let grads = ys.mean_all()?.backward()?;

  let data = model.varmap().data().lock().unwrap();
  for name in [
    "projection.weight",
    "decoder.0.conv2.weight",
    "bottleneck.conv1.weight",
    "encoder.0.conv1.weight",
  ] {
    assert!(grads.get(&data[name]).is_some(), "no gradient for {name}");
  }
  Ok(())
}

#[test]
fn forward_at_224_with_reduced_width() -> dilated_unet::Result<()> {
  let config = small_config(224, 4, 1);
  let model = build(&config, &Device::Cpu)?;

  let ys = model.forward(&random_input(2, &config)?)?;
  assert_eq!(ys.dims(), &[2, 224, 224, 1]);

  let (min, max) = bounds(&ys)?;
  assert!(min > 0. && max < 1., "[{min}, {max}]");
  Ok(())
}

#[test]
#[ignore = "full-width forward pass is slow on CPU in debug builds"]
fn forward_with_default_config() -> dilated_unet::Result<()> {
  let config = DilatedUnetConfig::default();
  let model = build(&config, &Device::Cpu)?;

  let ys = model.forward(&random_input(2, &config)?)?;
  assert_eq!(ys.dims(), &[2, 224, 224, 1]);

  let (min, max) = bounds(&ys)?;
  assert!(min > 0. && max < 1., "[{min}, {max}]");
  Ok(())
}
