//! Caller-owned parameter handles and parameter groups.
//!
//! The model owns its parameters; optimizers receive cloned [`Parameter`]
//! handles and mutate values and gradients through them. A handle's
//! [`ParamId`] is stable across value replacement, so optimizer state keyed
//! by id stays attached to the parameter even when rank growth changes its
//! shape.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use candle_core::{Device, Tensor};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, Result};
use crate::proj::{keep_top_values, GateProjection};

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identity of a parameter, stable for the lifetime of the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

struct ParamInner {
    value: Tensor,
    grad: Option<Tensor>,
}

/// Shared handle to a mutable tensor and its gradient.
///
/// Cloning is cheap and yields a handle to the same underlying storage.
/// The optimizer is granted write access for the duration of a step; it
/// never takes ownership of the storage.
#[derive(Clone)]
pub struct Parameter {
    id: ParamId,
    inner: Arc<RwLock<ParamInner>>,
}

impl Parameter {
    /// Wrap a tensor as a trainable parameter.
    #[must_use]
    pub fn new(value: Tensor) -> Self {
        Self {
            id: ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed)),
            inner: Arc::new(RwLock::new(ParamInner { value, grad: None })),
        }
    }

    /// Create a single-element parameter, the shape used by adapter gates.
    ///
    /// # Errors
    ///
    /// Returns an error if tensor creation fails.
    pub fn scalar(value: f32, device: &Device) -> Result<Self> {
        Ok(Self::new(Tensor::from_vec(vec![value], (1,), device)?))
    }

    /// Stable identity of this parameter.
    #[must_use]
    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Current value. The returned tensor shares storage with the handle.
    #[must_use]
    pub fn value(&self) -> Tensor {
        self.inner.read().value.clone()
    }

    /// Dimensions of the current value.
    #[must_use]
    pub fn dims(&self) -> Vec<usize> {
        self.inner.read().value.dims().to_vec()
    }

    /// Overwrite the value with a tensor of identical shape.
    ///
    /// # Errors
    ///
    /// Returns [`OptimError::ShapeMismatch`] if the shapes differ.
    pub fn set_value(&self, value: Tensor) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.value.dims() != value.dims() {
            return Err(OptimError::ShapeMismatch {
                expected: inner.value.dims().to_vec(),
                actual: value.dims().to_vec(),
            });
        }
        inner.value = value;
        Ok(())
    }

    /// Overwrite the value, allowing a shape change.
    ///
    /// Any optimizer state recorded for this parameter must be reset in the
    /// same operation; rank growth does so.
    pub(crate) fn replace_value(&self, value: Tensor) {
        let mut inner = self.inner.write();
        inner.value = value;
        inner.grad = None;
    }

    /// Gradient currently stored on this parameter, if any.
    #[must_use]
    pub fn grad(&self) -> Option<Tensor> {
        self.inner.read().grad.clone()
    }

    /// Store a gradient for the next step.
    ///
    /// # Errors
    ///
    /// Returns [`OptimError::ShapeMismatch`] if the gradient shape differs
    /// from the value shape.
    pub fn set_grad(&self, grad: Tensor) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.value.dims() != grad.dims() {
            return Err(OptimError::ShapeMismatch {
                expected: inner.value.dims().to_vec(),
                actual: grad.dims().to_vec(),
            });
        }
        inner.grad = Some(grad);
        Ok(())
    }

    /// Drop the stored gradient.
    pub fn clear_grad(&self) {
        self.inner.write().grad = None;
    }

    /// Read a single-element parameter as a scalar.
    ///
    /// # Errors
    ///
    /// Returns [`OptimError::ShapeMismatch`] if the value has more than one
    /// element.
    pub fn item(&self) -> Result<f32> {
        let value = self.value();
        if value.elem_count() != 1 {
            return Err(OptimError::ShapeMismatch {
                expected: vec![1],
                actual: value.dims().to_vec(),
            });
        }
        let flat = value.flatten_all()?.to_vec1::<f32>()?;
        Ok(flat[0])
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("id", &self.id)
            .field("dims", &self.dims())
            .finish()
    }
}

/// Role of a parameter group, selecting the update rule applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupRole {
    /// Scalar gates, one per adapter, pruned to enforce sparsity.
    Gates,
    /// Interleaved LoRA factor matrices; the pair at indices `2i`, `2i+1`
    /// belongs to adapter `i`.
    LoraFactors,
    /// Every other trainable tensor.
    Other,
}

/// An ordered set of parameters updated under one configuration.
#[derive(Debug)]
pub struct ParamGroup {
    /// Parameters in this group, in registration order.
    pub params: Vec<Parameter>,
    /// Role deciding which update rule the group receives.
    pub role: GroupRole,
    /// Learning rate override for this group.
    pub lr: Option<f64>,
    /// Weight decay override for this group.
    pub weight_decay: Option<f64>,
    /// Target active count for gate groups.
    pub k: Option<usize>,
    /// Projection applied to the collected gate vector.
    pub proj: GateProjection,
}

impl ParamGroup {
    /// Create a group with default settings for the given role.
    #[must_use]
    pub fn new(role: GroupRole, params: Vec<Parameter>) -> Self {
        Self {
            params,
            role,
            lr: None,
            weight_decay: None,
            k: None,
            proj: keep_top_values,
        }
    }

    /// Set a group-local learning rate.
    #[must_use]
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.lr = Some(lr);
        self
    }

    /// Set a group-local weight decay.
    #[must_use]
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = Some(weight_decay);
        self
    }

    /// Set the target active count for a gate group.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Replace the gate projection.
    #[must_use]
    pub fn with_proj(mut self, proj: GateProjection) -> Self {
        self.proj = proj;
        self
    }
}
