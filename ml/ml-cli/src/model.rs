//! Model selection shared by the commands.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use burn_ndarray::NdArray;
use clap::Args;
use ml_models::{Architecture, ImageClassifier, MobileNetV2, MobileNetV2Config, PostureNetV2, PostureNetV2Config};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backend the commands run on.
pub type CliBackend = NdArray<f32>;

/// A model of either architecture.
pub type Classifier = Box<dyn ImageClassifier<Backend = CliBackend>>;

/// Model flags. Flags override values from `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Architecture: mobilenetv2 or posturenetv2 [default: posturenetv2]
    #[arg(long)]
    pub architecture: Option<String>,

    /// Number of output classes [default: per architecture]
    #[arg(long)]
    pub classes: Option<usize>,

    /// Width multiplier [default: 1.0]
    #[arg(long)]
    pub width: Option<f32>,

    /// JSON model configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    /// Architecture name.
    #[serde(default)]
    pub architecture: Option<String>,

    /// Number of output classes.
    #[serde(default)]
    pub class_count: Option<usize>,

    /// Width multiplier.
    #[serde(default)]
    pub width_multiplier: Option<f32>,
}

/// Fully resolved model choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelChoice {
    pub architecture: Architecture,
    pub class_count: Option<usize>,
    pub width_multiplier: Option<f32>,
}

impl ModelArgs {
    /// Merges flags over the config file.
    pub fn resolve(&self) -> Result<ModelChoice> {
        let file = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read model config: {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse model config: {}", path.display()))?
            }
            None => ModelFile::default(),
        };
        merge(self, &file)
    }
}

fn merge(args: &ModelArgs, file: &ModelFile) -> Result<ModelChoice> {
    let name = args
        .architecture
        .as_deref()
        .or(file.architecture.as_deref())
        .unwrap_or("posturenetv2");
    let architecture = Architecture::from_name(name).ok_or_else(|| anyhow!("Unknown architecture: {name}"))?;
    Ok(ModelChoice {
        architecture,
        class_count: args.classes.or(file.class_count),
        width_multiplier: args.width.or(file.width_multiplier),
    })
}

/// Builds the selected model on the CPU backend.
pub fn build(args: &ModelArgs) -> Result<Classifier> {
    let choice = args.resolve()?;
    let device = Default::default();
    debug!(?choice, "Building model");

    let model: Classifier = match choice.architecture {
        Architecture::MobileNetV2 => {
            let mut config = MobileNetV2Config::default();
            if let Some(classes) = choice.class_count {
                config = config.with_class_count(classes);
            }
            if let Some(width) = choice.width_multiplier {
                config = config.with_width_multiplier(width);
            }
            Box::new(MobileNetV2::<CliBackend>::new(&config, &device).context("Invalid model configuration")?)
        }
        Architecture::PostureNetV2 => {
            let mut config = PostureNetV2Config::default();
            if let Some(classes) = choice.class_count {
                config = config.with_class_count(classes);
            }
            if let Some(width) = choice.width_multiplier {
                config = config.with_width_multiplier(width);
            }
            Box::new(PostureNetV2::<CliBackend>::new(&config, &device).context("Invalid model configuration")?)
        }
    };
    Ok(model)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file() {
        let args = ModelArgs {
            classes: Some(5),
            ..ModelArgs::default()
        };
        let file = ModelFile {
            architecture: Some("MobileNetV2".to_string()),
            class_count: Some(1000),
            width_multiplier: Some(0.5),
        };
        let choice = merge(&args, &file).unwrap();
        assert_eq!(choice.architecture, Architecture::MobileNetV2);
        assert_eq!(choice.class_count, Some(5));
        assert_eq!(choice.width_multiplier, Some(0.5));
    }

    #[test]
    fn defaults_to_posture_net() {
        let choice = merge(&ModelArgs::default(), &ModelFile::default()).unwrap();
        assert_eq!(choice.architecture, Architecture::PostureNetV2);
        assert_eq!(choice.class_count, None);
    }

    #[test]
    fn unknown_architecture_is_an_error() {
        let args = ModelArgs {
            architecture: Some("resnet50".to_string()),
            ..ModelArgs::default()
        };
        assert!(merge(&args, &ModelFile::default()).is_err());
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let _ = std::fs::write(&path, r#"{"architecture": "mobilenetv2", "width_multiplier": 0.35}"#);
        let args = ModelArgs {
            config: Some(path),
            ..ModelArgs::default()
        };
        let choice = args.resolve().unwrap();
        assert_eq!(choice.architecture, Architecture::MobileNetV2);
        assert_eq!(choice.width_multiplier, Some(0.35));
    }
}
