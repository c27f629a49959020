//! `imgclass inspect`.

use anyhow::{Context, Result};
use ml_checkpoint::load_store;
use owo_colors::OwoColorize;

pub fn run(path: &str) -> Result<()> {
    let store = load_store(path).with_context(|| format!("Failed to load checkpoint: {path}"))?;

    println!();
    println!("{}", path.bold());
    for (key, value) in store.metadata_map() {
        println!("  {} {}", format!("{key}:").dimmed(), value);
    }
    println!();
    for (key, tensor) in store.iter() {
        println!("{:<72} {:?}", key, tensor.shape);
    }
    println!();
    println!(
        "{} tensors, {} parameters",
        store.len().to_string().green(),
        store.parameter_count().to_string().green()
    );
    Ok(())
}
