//! `imgclass convert`.

use anyhow::{Context, Result, anyhow};
use ml_models::{CheckpointFormat, read_foreign_checkpoint, write_checkpoint};
use owo_colors::OwoColorize;
use tracing::warn;

use crate::model::{ModelArgs, build};

pub fn run(input: &str, output: &str, format: &str, args: &ModelArgs) -> Result<()> {
    let format = CheckpointFormat::from_extension(format).ok_or_else(|| anyhow!("Unknown checkpoint format: {format}"))?;
    let mut model = build(args)?;

    let foreign = read_foreign_checkpoint(model.as_mut(), input)
        .with_context(|| format!("Failed to read foreign checkpoint: {input}"))?;
    let report = &foreign.report;
    if report.absent_count() > 0 {
        warn!(absent = report.absent_count(), "Some foreign tensors were absent and keep their initial values");
    }
    for (key, error) in report.failures() {
        warn!(%key, %error, "Tensor not converted");
    }

    let written = write_checkpoint(model.as_ref(), output, format)
        .with_context(|| format!("Failed to write checkpoint: {output}"))?;

    println!(
        "{} {} loaded, {} absent, {} failed, {} layers",
        "✓".green(),
        report.loaded_count(),
        report.absent_count(),
        report.failure_count(),
        foreign.reported_layers
    );
    println!("  wrote {}", written.bold());
    Ok(())
}
