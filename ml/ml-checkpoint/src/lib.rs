//! Named-tensor checkpoint store and traversal protocol.
//!
//! A checkpoint is a flat mapping from string keys to dense `f32` tensors.
//! Model trees are mapped onto that mapping by explicit traversals, in one
//! of two key dialects.
//!
//! # Dialects
//!
//! - **Native**: keys are structural scope paths built from role names,
//!   e.g. `model/residual1/blocks/h0/conv1/w`. See [`ScopePath`].
//! - **Foreign**: keys come from a single counter shared by the whole
//!   traversal, e.g. `layer_with_weights-3/gamma/.ATTRIBUTES/VARIABLE_VALUE`.
//!   See [`LayerCounter`].
//!
//! # Failure Model
//!
//! Store-level failures ([`CheckpointError`]) abort an operation.
//! Per-tensor failures ([`TensorLoadError`]) are recorded in a
//! [`LoadReport`] and leave the affected tensor at its prior value; the
//! traversal carries on with its siblings.
//!
//! # Persistence
//!
//! - SafeTensors (compact, default)
//! - JSON (human-readable, debuggable)
//!
//! # Example
//!
//! ```
//! use ml_checkpoint::{ScopePath, StoredTensor, TensorStore};
//!
//! let mut store = TensorStore::new();
//! let scope = ScopePath::root("model").child("inputConv");
//! store.insert(scope.param("w"), StoredTensor::filled(vec![32, 3, 3, 3], 0.0));
//! assert!(store.contains("model/inputConv/w"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod counter;
mod error;
mod format;
mod layout;
mod report;
mod scope;
mod slot;
mod store;
mod summary;
mod traverse;

pub use counter::LayerCounter;
pub use error::{CheckpointError, Result, TensorLoadError};
pub use format::{CheckpointFormat, decode_safetensors, encode_safetensors, load_store, save_store};
pub use layout::KerasLayout;
pub use report::{ForeignLoadReport, LoadReport, LoadStatus, ShapePolicy, TensorOutcome};
pub use scope::ScopePath;
pub use slot::{TensorSlot, export_tensor, from_stored, load_foreign_tensor, load_native_tensor, to_stored};
pub use store::{StoredTensor, TensorStore};
pub use summary::{Summary, SummaryRecord};
pub use traverse::{ForeignImport, NativeExport, NativeImport, Summarize};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CheckpointError, CheckpointFormat, ForeignImport, ForeignLoadReport, KerasLayout, LayerCounter,
        LoadReport, NativeExport, NativeImport, ScopePath, ShapePolicy, StoredTensor, Summarize, Summary,
        TensorLoadError, TensorSlot, TensorStore,
    };
}
