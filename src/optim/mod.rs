//! The optimizer family.
//!
//! Base update rules ([`Sgd`], [`AdamW`], sign and compressed variants)
//! apply uniformly across a parameter group; the gated optimizers
//! ([`WeightAdamW`], [`FatAdamW`]) combine an Adam track for dense
//! parameters with a sparse-projection track for adapter gates.

use std::collections::HashMap;

use candle_core::Tensor;

use crate::config::AdamParams;
use crate::error::{OptimError, Result};
use crate::param::{ParamId, Parameter};

pub mod adamw;
pub mod fat;
pub mod qsgd;
pub mod sgd;
pub mod sign;
pub mod stoiht;
pub mod weight;

pub use adamw::AdamW;
pub use fat::{FatAdamW, FatAdamWConfig, GateSnapshot, RankExtension};
pub use qsgd::{Qsgd, QsgdConfig};
pub use sgd::Sgd;
pub use sign::{SignAdamW, SignSgd};
pub use stoiht::{StoIht, StoIhtConfig};
pub use weight::{WeightAdamW, WeightAdamWConfig, WeightAdamWLegacy, WeightAdamWLegacyConfig};

/// Per-parameter Adam state: step counter and both moment estimates.
///
/// Shaped identically to its parameter at creation; reset wholesale when
/// the parameter is resized.
#[derive(Debug, Clone)]
pub(crate) struct MomentState {
    pub step: usize,
    pub exp_avg: Tensor,
    pub exp_avg_sq: Tensor,
}

impl MomentState {
    pub fn zeros_like(value: &Tensor) -> Result<Self> {
        Ok(Self {
            step: 0,
            exp_avg: value.zeros_like()?,
            exp_avg_sq: value.zeros_like()?,
        })
    }
}

/// Fetch or lazily create the moment state for a parameter.
pub(crate) fn moment_entry<'a>(
    state: &'a mut HashMap<ParamId, MomentState>,
    param: &Parameter,
) -> Result<&'a mut MomentState> {
    if !state.contains_key(&param.id()) {
        state.insert(param.id(), MomentState::zeros_like(&param.value())?);
    }
    state.get_mut(&param.id()).ok_or_else(|| OptimError::DimensionMismatch {
        message: "optimizer state lookup failed after insertion".to_string(),
    })
}

/// One Adam update with decoupled weight decay.
///
/// Updates both moment estimates, optionally bias-corrects the step size,
/// applies `p -= step_size * exp_avg / (sqrt(exp_avg_sq) + eps)`, then the
/// decoupled decay `p *= 1 - lr * weight_decay`.
pub(crate) fn adam_update(
    param: &Parameter,
    grad: &Tensor,
    state: &mut MomentState,
    lr: f64,
    adam: &AdamParams,
    weight_decay: f64,
) -> Result<()> {
    let value = param.value();
    if grad.dims() != value.dims() {
        return Err(OptimError::ShapeMismatch {
            expected: value.dims().to_vec(),
            actual: grad.dims().to_vec(),
        });
    }

    state.step += 1;
    state.exp_avg = ((&state.exp_avg * adam.beta1)? + (grad * (1.0 - adam.beta1))?)?;
    state.exp_avg_sq = ((&state.exp_avg_sq * adam.beta2)? + (grad.sqr()? * (1.0 - adam.beta2))?)?;
    let denom = (state.exp_avg_sq.sqrt()? + adam.eps)?;

    let mut step_size = lr;
    if adam.correct_bias {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let step = state.step as i32;
        let bias_correction1 = 1.0 - adam.beta1.powi(step);
        let bias_correction2 = 1.0 - adam.beta2.powi(step);
        step_size = step_size * bias_correction2.sqrt() / bias_correction1;
    }

    let update = ((&state.exp_avg / &denom)? * step_size)?;
    let mut new_value = (value - update)?;
    if weight_decay > 0.0 {
        new_value = new_value.affine(1.0 - lr * weight_decay, 0.0)?;
    }
    param.set_value(new_value)
}

/// Read a single-element gradient as a scalar.
pub(crate) fn scalar_of(tensor: &Tensor) -> Result<f32> {
    if tensor.elem_count() != 1 {
        return Err(OptimError::ShapeMismatch {
            expected: vec![1],
            actual: tensor.dims().to_vec(),
        });
    }
    let flat = tensor.flatten_all()?.to_vec1::<f32>()?;
    Ok(flat[0])
}
