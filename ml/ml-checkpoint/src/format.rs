//! On-disk persistence for [`TensorStore`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CheckpointError, Result};
use crate::store::{StoredTensor, TensorStore};

/// Supported checkpoint file formats.
///
/// # Example
///
/// ```
/// use ml_checkpoint::CheckpointFormat;
///
/// let format = CheckpointFormat::from_extension("safetensors");
/// assert_eq!(format, Some(CheckpointFormat::SafeTensors));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckpointFormat {
    /// SafeTensors container - compact, memory-mappable.
    ///
    /// Tensors are written as little-endian `F32`; store metadata
    /// goes into the header's `__metadata__` table.
    #[default]
    SafeTensors,

    /// JSON format - human-readable.
    ///
    /// Larger file size, useful for inspecting small models
    /// and hand-editing test fixtures.
    Json,
}

impl CheckpointFormat {
    /// Determines format from file extension.
    ///
    /// - `.safetensors`, `.st` -> SafeTensors
    /// - `.json` -> Json
    /// - Other -> None
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "safetensors" | "st" => Some(Self::SafeTensors),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determines format from file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Returns the default file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::SafeTensors => "safetensors",
            Self::Json => "json",
        }
    }

    /// Returns the format name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SafeTensors => "safetensors",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Saves a tensor store to a file.
///
/// # Arguments
///
/// - `store`: The store to persist
/// - `path`: Output file path (without extension)
/// - `format`: Checkpoint format to use
///
/// # Returns
///
/// The full path to the saved checkpoint (with extension added).
///
/// # Errors
///
/// Returns `CheckpointError::StoreUnwritable` if encoding or writing fails.
pub fn save_store(store: &TensorStore, path: &str, format: CheckpointFormat) -> Result<String> {
    let full_path = format!("{}.{}", path, format.extension());

    let bytes = match format {
        CheckpointFormat::SafeTensors => encode_safetensors(store)
            .map_err(|e| CheckpointError::store_unwritable(&full_path, e.to_string()))?,
        CheckpointFormat::Json => serde_json::to_vec_pretty(store)
            .map_err(|e| CheckpointError::store_unwritable(&full_path, e.to_string()))?,
    };

    if let Some(parent) = Path::new(&full_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| CheckpointError::store_unwritable(&full_path, e.to_string()))?;
        }
    }
    fs::write(&full_path, bytes)
        .map_err(|e| CheckpointError::store_unwritable(&full_path, e.to_string()))?;

    info!(path = %full_path, tensors = store.len(), %format, "wrote tensor store");
    Ok(full_path)
}

/// Loads a tensor store from a file.
///
/// # Arguments
///
/// - `path`: Path to the checkpoint file (with extension)
///
/// # Errors
///
/// Returns `CheckpointError::CheckpointNotFound` if the file doesn't exist.
/// Returns `CheckpointError::UnsupportedFormat` if the format can't be determined.
/// Returns `CheckpointError::StoreUnreadable` if the file can't be read or parsed.
pub fn load_store(path: &str) -> Result<TensorStore> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return Err(CheckpointError::checkpoint_not_found(path));
    }

    let format = CheckpointFormat::from_path(path_obj)
        .ok_or_else(|| CheckpointError::unsupported_format(path))?;

    let bytes = fs::read(path_obj).map_err(|e| CheckpointError::store_unreadable(path, e.to_string()))?;

    let store = match format {
        CheckpointFormat::SafeTensors => decode_safetensors(&bytes, path)?,
        CheckpointFormat::Json => {
            let store: TensorStore = serde_json::from_slice(&bytes)
                .map_err(|e| CheckpointError::store_unreadable(path, e.to_string()))?;
            store
                .validate()
                .map_err(|e| CheckpointError::store_unreadable(path, e.to_string()))?;
            store
        }
    };

    info!(path, tensors = store.len(), %format, "loaded tensor store");
    Ok(store)
}

/// Encodes a store as a SafeTensors byte buffer.
///
/// # Errors
///
/// Returns `CheckpointError::InvalidTensor` for an inconsistent tensor, or
/// `CheckpointError::Serialization` if the container can't be built.
pub fn encode_safetensors(store: &TensorStore) -> Result<Vec<u8>> {
    store.validate()?;

    let payloads: Vec<(&str, &StoredTensor, Vec<u8>)> = store
        .iter()
        .map(|(key, tensor)| {
            let bytes = tensor.values.iter().flat_map(|v| v.to_le_bytes()).collect();
            (key, tensor, bytes)
        })
        .collect();

    let views: HashMap<String, TensorView<'_>> = payloads
        .iter()
        .map(|(key, tensor, bytes)| {
            let view = TensorView::new(Dtype::F32, tensor.shape.clone(), bytes.as_slice())
                .map_err(|e| CheckpointError::serialization(format!("{key}: {e}")))?;
            Ok(((*key).to_string(), view))
        })
        .collect::<Result<_>>()?;

    let metadata: HashMap<String, String> = store
        .metadata_map()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let metadata = (!metadata.is_empty()).then_some(metadata);

    safetensors::serialize(&views, metadata).map_err(|e| CheckpointError::serialization(e.to_string()))
}

/// Decodes a SafeTensors byte buffer into a store.
///
/// `origin` only labels errors.
///
/// # Errors
///
/// Returns `CheckpointError::StoreUnreadable` if the buffer is malformed or holds
/// a tensor whose dtype is not `F32`.
pub fn decode_safetensors(bytes: &[u8], origin: &str) -> Result<TensorStore> {
    let tensors =
        SafeTensors::deserialize(bytes).map_err(|e| CheckpointError::store_unreadable(origin, e.to_string()))?;
    let (_, header) = SafeTensors::read_metadata(bytes)
        .map_err(|e| CheckpointError::store_unreadable(origin, e.to_string()))?;

    let mut store = TensorStore::new();
    if let Some(metadata) = header.metadata() {
        for (key, value) in metadata {
            store.set_metadata(key.clone(), value.clone());
        }
    }

    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(CheckpointError::store_unreadable(
                origin,
                format!("tensor {name} has dtype {:?}, expected F32", view.dtype()),
            ));
        }
        let values = view
            .data()
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        store.insert(name, StoredTensor::new(view.shape().to_vec(), values));
    }

    Ok(store)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_store() -> TensorStore {
        let mut store = TensorStore::new();
        store.insert(
            "model/inputConv/w",
            StoredTensor::new(vec![2, 1, 1, 2], vec![0.5, -1.25, 3.0, 1e-7]),
        );
        store.insert("model/inputConvBN/m", StoredTensor::new(vec![2], vec![0.0, 1.0]));
        store.set_metadata("architecture", "PostureNetV2");
        store
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            CheckpointFormat::from_extension("safetensors"),
            Some(CheckpointFormat::SafeTensors)
        );
        assert_eq!(
            CheckpointFormat::from_extension("st"),
            Some(CheckpointFormat::SafeTensors)
        );
        assert_eq!(
            CheckpointFormat::from_extension("json"),
            Some(CheckpointFormat::Json)
        );
        assert_eq!(
            CheckpointFormat::from_extension("JSON"),
            Some(CheckpointFormat::Json)
        );
        assert_eq!(CheckpointFormat::from_extension("ckpt"), None);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.safetensors")),
            Some(CheckpointFormat::SafeTensors)
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("/path/to/model.json")),
            Some(CheckpointFormat::Json)
        );
        assert_eq!(CheckpointFormat::from_path(Path::new("model.ckpt")), None);
        assert_eq!(CheckpointFormat::from_path(Path::new("model")), None);
    }

    #[test]
    fn format_extension_and_name() {
        assert_eq!(CheckpointFormat::SafeTensors.extension(), "safetensors");
        assert_eq!(CheckpointFormat::Json.extension(), "json");
        assert_eq!(format!("{}", CheckpointFormat::Json), "json");
        assert_eq!(CheckpointFormat::default(), CheckpointFormat::SafeTensors);
    }

    #[test]
    fn json_keeps_small_values() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("small");
        let saved = save_store(&sample_store(), &base.to_string_lossy(), CheckpointFormat::Json).unwrap();

        let loaded = load_store(&saved).unwrap();
        let kernel = &loaded.get("model/inputConv/w").unwrap().values;
        assert_eq!(kernel.len(), 4);
        assert_relative_eq!(kernel[1], -1.25);
        assert_relative_eq!(kernel[3], 1e-7, max_relative = 1e-6);
    }

    #[test]
    fn safetensors_bytes_round_trip() {
        let store = sample_store();
        let bytes = encode_safetensors(&store).unwrap();
        let decoded = decode_safetensors(&bytes, "memory").unwrap();
        assert_eq!(decoded, store);
    }

    #[test]
    fn safetensors_rejects_garbage() {
        let err = decode_safetensors(&[1, 2, 3], "garbage.safetensors");
        assert!(matches!(err, Err(CheckpointError::StoreUnreadable { .. })));
    }

    #[test]
    fn encode_rejects_inconsistent_tensor() {
        let mut store = TensorStore::new();
        store.insert("bad", StoredTensor::new(vec![3], vec![1.0]));
        assert!(matches!(
            encode_safetensors(&store),
            Err(CheckpointError::InvalidTensor { .. })
        ));
    }

    #[test]
    fn save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let store = sample_store();

        for format in [CheckpointFormat::SafeTensors, CheckpointFormat::Json] {
            let base = dir.path().join("nested").join("model");
            let saved = save_store(&store, &base.to_string_lossy(), format).unwrap();
            assert!(saved.ends_with(format.extension()));
            assert_eq!(load_store(&saved).unwrap(), store);
        }
    }

    #[test]
    fn load_missing_file() {
        let err = load_store("/definitely/not/here.safetensors");
        assert!(matches!(err, Err(CheckpointError::CheckpointNotFound(_))));
    }

    #[test]
    fn load_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ckpt").tempfile().unwrap();
        let err = load_store(&file.path().to_string_lossy());
        assert!(matches!(err, Err(CheckpointError::UnsupportedFormat(_))));
    }

    #[test]
    fn load_corrupt_json() {
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        fs::write(file.path(), b"{ not json").unwrap();
        let err = load_store(&file.path().to_string_lossy());
        assert!(matches!(err, Err(CheckpointError::StoreUnreadable { .. })));
    }
}
