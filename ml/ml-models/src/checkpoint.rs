//! Checkpoint entry points shared by every image classifier.

use std::path::Path;

use burn::prelude::Backend;
use burn::tensor::Tensor;
use ml_checkpoint::{
    CheckpointFormat, ForeignImport, ForeignLoadReport, LayerCounter, LoadReport, NativeExport, NativeImport,
    ScopePath, Summarize, Summary, TensorStore, load_store, save_store,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::layers::Dense;

/// Root scope under which native checkpoints are written.
pub const ROOT_SCOPE: &str = "model";

/// Value of the `dialect` metadata entry in native checkpoints.
pub const NATIVE_DIALECT: &str = "native";

/// Supported network architectures.
///
/// # Example
///
/// ```
/// use ml_models::Architecture;
///
/// assert_eq!(Architecture::from_name("posturenetv2"), Some(Architecture::PostureNetV2));
/// assert_eq!(Architecture::MobileNetV2.name(), "MobileNetV2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// Plain `MobileNetV2`.
    MobileNetV2,

    /// `MobileNetV2` backbone with the posture head.
    PostureNetV2,
}

impl Architecture {
    /// Parses an architecture name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mobilenetv2" | "mobilenet_v2" => Some(Self::MobileNetV2),
            "posturenetv2" | "posture_net_v2" => Some(Self::PostureNetV2),
            _ => None,
        }
    }

    /// Canonical name, as stamped in checkpoint metadata.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MobileNetV2 => "MobileNetV2",
            Self::PostureNetV2 => "PostureNetV2",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A classifier that can be persisted in both checkpoint dialects.
pub trait ImageClassifier: NativeExport + NativeImport + ForeignImport + Summarize {
    /// Backend the model runs on.
    type Backend: Backend;

    /// Architecture of this model.
    fn architecture(&self) -> Architecture;

    /// Number of output classes.
    fn class_count(&self) -> usize;

    /// Width multiplier the model was built with.
    fn width_multiplier(&self) -> f32;

    /// Class logits `[N, class_count]` for images `[N, 3, H, W]`.
    fn forward(&self, images: Tensor<Self::Backend, 4>) -> Tensor<Self::Backend, 2>;

    /// The dense classifier head.
    fn classifier_mut(&mut self) -> &mut Dense<Self::Backend>;
}

/// Exports a model's tensors and stamps its metadata.
#[must_use]
pub fn export_store<M: ImageClassifier + ?Sized>(model: &M) -> TensorStore {
    let mut store = TensorStore::new();
    model.export_native(&ScopePath::root(ROOT_SCOPE), &mut store);
    store.set_metadata("architecture", model.architecture().name());
    store.set_metadata("class_count", model.class_count().to_string());
    store.set_metadata("width_multiplier", model.width_multiplier().to_string());
    store.set_metadata("dialect", NATIVE_DIALECT);
    store
}

/// Loads native tensors from `store` into `model`.
///
/// Metadata that disagrees with the model is logged and loading continues;
/// the per-tensor report says what actually fit.
pub fn import_store<M: ImageClassifier + ?Sized>(model: &mut M, store: &TensorStore) -> LoadReport {
    warn_on_metadata_mismatch(model, store);
    let mut report = LoadReport::new();
    model.import_native(&ScopePath::root(ROOT_SCOPE), store, &mut report);
    report
}

/// Loads foreign tensors from `store` into `model`.
///
/// The backbone is numbered inside layer 0 of the top-level scope and the
/// classifier is the next top-level layer.
pub fn import_foreign_store<M: ImageClassifier + ?Sized>(model: &mut M, store: &TensorStore) -> ForeignLoadReport {
    let mut report = LoadReport::new();
    let mut top = LayerCounter::new();
    let mut backbone = LayerCounter::with_prefix(format!("{}/", LayerCounter::layer_segment(top.current())));

    model.import_foreign(store, &mut backbone, &mut report);
    top.advance();
    model.classifier_mut().import_foreign(store, &mut top, &mut report);

    ForeignLoadReport::new(report, backbone.current(), top.current())
}

/// Writes a native checkpoint to `path` plus the format's extension.
///
/// # Errors
///
/// Returns `ModelError::Checkpoint` if the store cannot be written.
pub fn write_checkpoint<M: ImageClassifier + ?Sized>(model: &M, path: &str, format: CheckpointFormat) -> Result<String> {
    let store = export_store(model);
    let written = save_store(&store, path, format)?;
    info!(
        architecture = %model.architecture(),
        tensors = store.len(),
        parameters = store.parameter_count(),
        path = %written,
        "Wrote checkpoint"
    );
    Ok(written)
}

/// Reads a native checkpoint into `model`.
///
/// # Errors
///
/// Returns `ModelError::Checkpoint` if the file is missing, has an unknown
/// extension or cannot be parsed. Per-tensor problems are in the report.
pub fn read_checkpoint<M: ImageClassifier + ?Sized>(model: &mut M, path: impl AsRef<Path>) -> Result<LoadReport> {
    let path = path.as_ref().to_string_lossy();
    let store = load_store(&path)?;
    let report = import_store(model, &store);
    info!(
        path = %path,
        loaded = report.loaded_count(),
        failed = report.failure_count(),
        "Read checkpoint"
    );
    Ok(report)
}

/// Reads a foreign checkpoint into `model`.
///
/// # Errors
///
/// Returns `ModelError::Checkpoint` if the store cannot be loaded.
pub fn read_foreign_checkpoint<M: ImageClassifier + ?Sized>(model: &mut M, path: impl AsRef<Path>) -> Result<ForeignLoadReport> {
    let path = path.as_ref().to_string_lossy();
    let store = load_store(&path)?;
    let foreign = import_foreign_store(model, &store);
    info!(
        path = %path,
        loaded = foreign.report.loaded_count(),
        absent = foreign.report.absent_count(),
        layers = foreign.reported_layers,
        "Read foreign checkpoint"
    );
    Ok(foreign)
}

/// Summarizes a model under the root scope.
#[must_use]
pub fn summarize<M: ImageClassifier + ?Sized>(model: &M) -> Summary {
    let mut summary = Summary::new();
    model.summarize(&ScopePath::root(ROOT_SCOPE), &mut summary);
    summary
}

fn warn_on_metadata_mismatch<M: ImageClassifier + ?Sized>(model: &M, store: &TensorStore) {
    if let Some(stored) = store.metadata("architecture") {
        if Architecture::from_name(stored) != Some(model.architecture()) {
            warn!(stored, model = %model.architecture(), "Checkpoint architecture mismatch");
        }
    }
    if let Some(stored) = store.metadata("class_count") {
        if stored.parse::<usize>().ok() != Some(model.class_count()) {
            warn!(stored, model = model.class_count(), "Checkpoint class count mismatch");
        }
    }
    if let Some(stored) = store.metadata("width_multiplier") {
        let matches = stored
            .parse::<f32>()
            .is_ok_and(|w| (w - model.width_multiplier()).abs() < f32::EPSILON);
        if !matches {
            warn!(stored, model = model.width_multiplier(), "Checkpoint width multiplier mismatch");
        }
    }
    if let Some(dialect) = store.metadata("dialect") {
        if dialect != NATIVE_DIALECT {
            warn!(dialect, "Checkpoint is not in the native dialect");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{PostureNetV2, PostureNetV2Config};
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn small_model() -> PostureNetV2<TestBackend> {
        let config = PostureNetV2Config::default().with_width_multiplier(0.35);
        PostureNetV2::new(&config, &Default::default()).expect("valid config")
    }

    #[test]
    fn architecture_names() {
        assert_eq!(Architecture::from_name("MobileNetV2"), Some(Architecture::MobileNetV2));
        assert_eq!(Architecture::from_name("mobilenet_v2"), Some(Architecture::MobileNetV2));
        assert_eq!(Architecture::from_name("resnet"), None);
        assert_eq!(Architecture::PostureNetV2.to_string(), "PostureNetV2");
    }

    #[test]
    fn export_stamps_metadata() {
        let model = small_model();
        let store = export_store(&model);
        assert_eq!(store.metadata("architecture"), Some("PostureNetV2"));
        assert_eq!(store.metadata("class_count"), Some("2"));
        assert_eq!(store.metadata("width_multiplier"), Some("0.35"));
        assert_eq!(store.metadata("dialect"), Some(NATIVE_DIALECT));
        assert!(store.keys().all(|k| k.starts_with("model/")));
    }

    #[test]
    fn import_with_mismatched_metadata_still_loads() {
        let source = small_model();
        let mut target = small_model();
        let mut store = export_store(&source);
        store.set_metadata("architecture", "MobileNetV2");
        store.set_metadata("class_count", "1000");

        let report = import_store(&mut target, &store);
        assert!(report.is_complete());
        assert_eq!(report.loaded_count(), store.len());
    }

    #[test]
    fn read_missing_checkpoint_fails() {
        let mut model = small_model();
        let result = read_checkpoint(&mut model, "/nonexistent/model.safetensors");
        assert!(result.is_err());
    }

    #[test]
    fn write_then_read_json() {
        let source = small_model();
        let mut target = small_model();
        let dir = tempdir().unwrap();
        let base = dir.path().join("posture");

        let written = write_checkpoint(&source, &base.to_string_lossy(), CheckpointFormat::Json).unwrap();
        assert!(written.ends_with(".json"));

        let report = read_checkpoint(&mut target, &written).unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn foreign_import_of_empty_store_is_all_absent() {
        let mut model = small_model();
        let foreign = import_foreign_store(&mut model, &TensorStore::new());
        assert_eq!(foreign.backbone_layers, 104);
        assert_eq!(foreign.classifier_layers, 2);
        assert_eq!(foreign.reported_layers, 104);
        assert_eq!(foreign.report.loaded_count(), 0);
        assert_eq!(foreign.report.failure_count(), 0);
        assert!(foreign.report.absent_count() > 0);
    }

    #[test]
    fn summary_starts_with_architecture() {
        let model = small_model();
        let summary = summarize(&model);
        let first = summary.records().first().map(|r| (r.kind.clone(), r.scope.clone()));
        assert_eq!(first, Some(("PostureNetV2".to_string(), "model".to_string())));
        assert_eq!(summary.total_parameters(), export_store(&model).parameter_count());
    }
}
