//! `imgclass dataset`.

use anyhow::{Context, Result, anyhow};
use ml_dataset::{ImageSizeVariant, PostureDataset, PostureDatasetConfig, Split};
use owo_colors::OwoColorize;

pub fn run(root: &str, variant: &str) -> Result<()> {
    let variant = ImageSizeVariant::from_name(variant).ok_or_else(|| anyhow!("Unknown size variant: {variant}"))?;
    let config = PostureDatasetConfig::new(root).with_size_variant(variant);
    let dir = config.dataset_dir();
    let dataset = PostureDataset::open(config).with_context(|| format!("Failed to open dataset: {}", dir.display()))?;

    println!();
    println!("{}", dir.display().to_string().bold());
    for split in [Split::Train, Split::Val] {
        println!();
        print!("{}", dataset.summary(split).to_report());
    }
    Ok(())
}
