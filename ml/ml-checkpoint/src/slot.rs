//! Moving values between backend tensors and the store.

use burn::module::{Param, RunningState};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use tracing::warn;

use crate::error::TensorLoadError;
use crate::layout::KerasLayout;
use crate::report::{LoadReport, ShapePolicy};
use crate::scope::ScopePath;
use crate::store::{StoredTensor, TensorStore};

/// Detaches a backend tensor into a [`StoredTensor`].
#[must_use]
pub fn to_stored<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> StoredTensor {
    let data = tensor.to_data();
    let shape = data.shape.clone();
    StoredTensor::new(shape, data.iter::<f32>().collect())
}

/// Builds a backend tensor from a consistent [`StoredTensor`] of rank `D`.
#[must_use]
pub fn from_stored<B: Backend, const D: usize>(tensor: &StoredTensor, device: &B::Device) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(tensor.values.clone(), tensor.shape.clone()), device)
}

/// A tensor-valued field of a layer that a checkpoint can read or overwrite.
pub trait TensorSlot {
    /// Current shape.
    fn shape(&self) -> Vec<usize>;

    /// Current values.
    fn to_stored(&self) -> StoredTensor;

    /// Replaces the values. The caller has checked rank and consistency.
    fn assign(&mut self, tensor: &StoredTensor);
}

impl<B: Backend, const D: usize> TensorSlot for Param<Tensor<B, D>> {
    fn shape(&self) -> Vec<usize> {
        self.val().dims().to_vec()
    }

    fn to_stored(&self) -> StoredTensor {
        to_stored(&self.val())
    }

    fn assign(&mut self, tensor: &StoredTensor) {
        let current = self.val();
        let mut value = from_stored::<B, D>(tensor, &current.device());
        if current.is_require_grad() {
            value = value.require_grad();
        }
        *self = Param::initialized(self.id.clone(), value);
    }
}

impl<B: Backend, const D: usize> TensorSlot for RunningState<Tensor<B, D>> {
    fn shape(&self) -> Vec<usize> {
        self.value().dims().to_vec()
    }

    fn to_stored(&self) -> StoredTensor {
        to_stored(&self.value())
    }

    fn assign(&mut self, tensor: &StoredTensor) {
        let device = self.value().device();
        *self = RunningState::new(from_stored::<B, D>(tensor, &device));
    }
}

/// Writes a slot under `key`. A key written twice keeps the later value.
pub fn export_tensor<S: TensorSlot + ?Sized>(slot: &S, key: String, store: &mut TensorStore) {
    if store.insert(key.clone(), slot.to_stored()).is_some() {
        warn!(%key, "duplicate checkpoint key, later write wins");
    }
}

/// Loads a slot from the first present native candidate.
///
/// `shorts` lists the parameter short names in probe order, current
/// spelling first. A found tensor the policy rejects is reported as
/// [`TensorLoadError::ShapeMismatch`]; no candidate present is reported as
/// [`TensorLoadError::KeyNotFound`]. Either way the slot is untouched.
pub fn load_native_tensor<S: TensorSlot + ?Sized>(
    slot: &mut S,
    scope: &ScopePath,
    shorts: &[&str],
    store: &TensorStore,
    policy: ShapePolicy,
    report: &mut LoadReport,
) {
    let candidates = scope.candidates(shorts);
    match store.first_present(&candidates) {
        Some((key, found)) => assign_checked(slot, key, found, policy, report),
        None => {
            let key = candidates.first().cloned().unwrap_or_default();
            report.record_failure(key, TensorLoadError::KeyNotFound { candidates });
        }
    }
}

/// Loads a slot from a foreign key, converting its memory layout first.
///
/// An absent key is a silent skip. The converted tensor is checked against
/// the slot with `policy`: trainable weights use [`ShapePolicy::Strict`],
/// moving statistics [`ShapePolicy::Relaxed`].
pub fn load_foreign_tensor<S: TensorSlot + ?Sized>(
    slot: &mut S,
    key: &str,
    layout: KerasLayout,
    store: &TensorStore,
    policy: ShapePolicy,
    report: &mut LoadReport,
) {
    match store.get(key) {
        Some(found) => {
            let native = layout.to_native(found);
            assign_checked(slot, key, &native, policy, report);
        }
        None => report.record_absent(key),
    }
}

fn assign_checked<S: TensorSlot + ?Sized>(
    slot: &mut S,
    key: &str,
    found: &StoredTensor,
    policy: ShapePolicy,
    report: &mut LoadReport,
) {
    let expected = slot.shape();
    if found.is_consistent() && policy.accepts(&expected, &found.shape) {
        slot.assign(found);
        report.record_loaded(key);
    } else {
        report.record_failure(
            key,
            TensorLoadError::ShapeMismatch {
                key: key.to_string(),
                expected,
                found: found.shape.clone(),
            },
        );
    }
}
