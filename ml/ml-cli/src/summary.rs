//! `imgclass summary`.

use anyhow::{Context, Result};
use ml_models::summarize;

use crate::model::{ModelArgs, build};

pub fn run(args: &ModelArgs, json: bool) -> Result<()> {
    let model = build(args)?;
    let summary = summarize(model.as_ref());
    if json {
        let text = serde_json::to_string_pretty(summary.records()).context("Failed to encode summary")?;
        println!("{text}");
    } else {
        print!("{}", summary.render_table());
    }
    Ok(())
}
