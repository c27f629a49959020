//! `imgclass predict`.

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::activation::softmax;
use ml_dataset::{Normalization, load_single};
use ml_models::{read_checkpoint, read_foreign_checkpoint};
use owo_colors::OwoColorize;
use tracing::warn;

use crate::model::{CliBackend, ModelArgs, build};

pub struct PredictArgs {
    pub checkpoint: String,
    pub image: String,
    pub foreign: bool,
    pub labels: Vec<String>,
    pub size: u32,
    pub model: ModelArgs,
}

pub fn run(args: &PredictArgs) -> Result<()> {
    let mut model = build(&args.model)?;
    let report = if args.foreign {
        read_foreign_checkpoint(model.as_mut(), &args.checkpoint).map(|foreign| foreign.report)
    } else {
        read_checkpoint(model.as_mut(), &args.checkpoint)
    }
    .with_context(|| format!("Failed to read checkpoint: {}", args.checkpoint))?;
    if report.failure_count() > 0 {
        warn!(failed = report.failure_count(), "Checkpoint did not fully load");
    }

    let device = Default::default();
    let batch = load_single::<CliBackend>(
        Path::new(&args.image),
        args.size,
        Some(&Normalization::imagenet()),
        &device,
    )
    .with_context(|| format!("Failed to load image: {}", args.image))?;

    let probabilities = softmax(model.forward(batch.images), 1);
    let values: Vec<f32> = probabilities
        .to_data()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read probabilities: {e:?}"))?;

    let best = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(index, _)| index);
    for (index, probability) in values.iter().enumerate() {
        let name = args.labels.get(index).map_or_else(|| format!("class {index}"), Clone::clone);
        let line = format!("{name:<24} {probability:.4}");
        if index == best {
            println!("{}", line.green().bold());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}
