//! `imgclass`: command-line front end for the posture classifiers.
//!
//! # Commands
//!
//! - `imgclass summary` - print the layer table of a model
//! - `imgclass inspect <STORE>` - list the tensors of a checkpoint
//! - `imgclass convert <FOREIGN> <OUTPUT>` - rewrite a foreign checkpoint natively
//! - `imgclass predict <CHECKPOINT> <IMAGE>` - class probabilities for one image
//! - `imgclass dataset <ROOT>` - per-split class counts
//!
//! Logging goes to stderr; `RUST_LOG` overrides the `-v` level.

mod convert;
mod dataset;
mod inspect;
mod model;
mod predict;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::model::ModelArgs;

/// Image classification tools
#[derive(Parser)]
#[command(name = "imgclass")]
#[command(about = "MobileNetV2-family image classification tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the layer table of a model
    Summary {
        #[command(flatten)]
        model: ModelArgs,

        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tensors and metadata of a checkpoint
    Inspect {
        /// Checkpoint file (.safetensors, .st or .json)
        #[arg(name = "STORE")]
        store: String,
    },

    /// Load a foreign checkpoint and write it in the native dialect
    Convert {
        /// Foreign checkpoint file
        #[arg(name = "FOREIGN")]
        input: String,

        /// Output path without extension
        #[arg(name = "OUTPUT")]
        output: String,

        /// Output format
        #[arg(long, default_value = "safetensors")]
        format: String,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Classify one image
    Predict {
        /// Checkpoint file
        #[arg(name = "CHECKPOINT")]
        checkpoint: String,

        /// Image file
        #[arg(name = "IMAGE")]
        image: String,

        /// The checkpoint is in the foreign dialect
        #[arg(long)]
        foreign: bool,

        /// Comma-separated class names in label order
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        /// Side length the image is resized to
        #[arg(long, default_value_t = 224)]
        size: u32,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Print per-split class counts of a posture dataset
    Dataset {
        /// Directory holding the dataset directories
        #[arg(name = "ROOT")]
        root: String,

        /// Size variant: full, resized150 or resized320
        #[arg(long, default_value = "resized320")]
        variant: String,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Summary { model, json } => summary::run(&model, json),
        Commands::Inspect { store } => inspect::run(&store),
        Commands::Convert {
            input,
            output,
            format,
            model,
        } => convert::run(&input, &output, &format, &model),
        Commands::Predict {
            checkpoint,
            image,
            foreign,
            labels,
            size,
            model,
        } => predict::run(&predict::PredictArgs {
            checkpoint,
            image,
            foreign,
            labels,
            size,
            model,
        }),
        Commands::Dataset { root, variant } => dataset::run(&root, &variant),
    }
}
