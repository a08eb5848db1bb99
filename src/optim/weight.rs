//! Gated AdamW: Adam for dense parameters, sparse projection for gates.
//!
//! The gate track deliberately avoids Adam's moment scaling: a gate is a
//! single scalar whose projected value must stay directly comparable to
//! its peers, so it descends along the raw gradient and is periodically
//! projected to the top-`k` active set.

use std::collections::HashMap;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::config::AdamParams;
use crate::error::{OptimError, Result};
use crate::optim::{adam_update, moment_entry, scalar_of, MomentState};
use crate::param::{GroupRole, ParamGroup, ParamId, Parameter};
use crate::proj::{apply_mask, top_values_mask, GateProjection, MaskProjection};
use crate::traits::{OptimConfig, Optimizer};

/// Threshold below which the gate gradient vector counts as vanished.
const GATE_GRAD_NORM_FLOOR: f64 = 1e-10;

/// Configuration for [`WeightAdamW`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightAdamWConfig {
    /// Adam hyperparameters for the dense track.
    pub adam: AdamParams,
    /// Period, in steps, of the gate projection.
    #[serde(default = "default_fat_step")]
    pub fat_step: usize,
}

fn default_fat_step() -> usize {
    1
}

impl Default for WeightAdamWConfig {
    fn default() -> Self {
        Self {
            adam: AdamParams::default(),
            fat_step: default_fat_step(),
        }
    }
}

impl OptimConfig for WeightAdamWConfig {
    fn validate(&self) -> Result<()> {
        self.adam.validate()?;
        if self.fat_step == 0 {
            return Err(OptimError::InvalidConfig(
                "fat_step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Two-track optimizer enforcing a top-`k` active adapter set.
///
/// Groups with [`GroupRole::Gates`] take a plain descent step per scalar
/// gate; every `fat_step` steps the collected gate vector is projected
/// through the group's projection with target count `group.k`, zeroing all
/// but the `k` largest gates. All other groups receive the standard AdamW
/// update.
pub struct WeightAdamW {
    groups: Vec<ParamGroup>,
    config: WeightAdamWConfig,
    state: HashMap<ParamId, MomentState>,
    gate_steps: usize,
}

impl WeightAdamW {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(groups: Vec<ParamGroup>, config: WeightAdamWConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            groups,
            config,
            state: HashMap::new(),
            gate_steps: 0,
        })
    }
}

impl Optimizer for WeightAdamW {
    fn step(&mut self) -> Result<()> {
        let Self {
            groups,
            config,
            state,
            gate_steps,
        } = self;

        for group in groups.iter() {
            match group.role {
                GroupRole::Gates => {
                    let lr = group.lr.unwrap_or(config.adam.lr);
                    let mut gate_values = Vec::new();
                    let mut gate_grads = Vec::new();
                    let mut touched = Vec::new();
                    for (i, param) in group.params.iter().enumerate() {
                        let Some(grad) = param.grad() else { continue };
                        param.set_value((param.value() - (&grad * lr)?)?)?;
                        gate_grads.push(scalar_of(&grad)?);
                        gate_values.push(param.item()?);
                        touched.push(i);
                    }
                    *gate_steps += 1;

                    if *gate_steps % config.fat_step == 0 {
                        let norm = gate_grads
                            .iter()
                            .map(|g| f64::from(*g) * f64::from(*g))
                            .sum::<f64>()
                            .sqrt();
                        if norm > GATE_GRAD_NORM_FLOOR {
                            let k = group.k.ok_or_else(|| {
                                OptimError::InvalidConfig(
                                    "gate group requires a target count k".to_string(),
                                )
                            })?;
                            let device = group.params[touched[0]].value().device().clone();
                            let vector =
                                Tensor::from_vec(gate_values, (touched.len(),), &device)?;
                            let projected = (group.proj)(&vector, k)?.to_vec1::<f32>()?;
                            for (j, &i) in touched.iter().enumerate() {
                                group.params[i].set_value(Tensor::from_vec(
                                    vec![projected[j]],
                                    (1,),
                                    &device,
                                )?)?;
                            }
                        }
                    }
                }
                GroupRole::LoraFactors | GroupRole::Other => {
                    let lr = group.lr.unwrap_or(config.adam.lr);
                    let weight_decay = group.weight_decay.unwrap_or(config.adam.weight_decay);
                    for param in &group.params {
                        let Some(grad) = param.grad() else { continue };
                        let entry = moment_entry(state, param)?;
                        adam_update(param, &grad, entry, lr, &config.adam, weight_decay)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.adam.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.adam.lr = lr;
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.clear_grad();
            }
        }
    }
}

/// Configuration for [`WeightAdamWLegacy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightAdamWLegacyConfig {
    /// Adam hyperparameters for the dense track.
    pub adam: AdamParams,
    /// Sparsity target for the gate projection.
    pub k: usize,
}

impl OptimConfig for WeightAdamWLegacyConfig {
    fn validate(&self) -> Result<()> {
        self.adam.validate()
    }
}

/// Superseded gated variant operating on undifferentiated groups.
///
/// Instead of a role tag, gates are recognized by shape: every
/// single-element parameter is treated as a gate. The gate track combines
/// descent with a support-mask / mask-application pair rather than a
/// direct top-`k` overwrite. Retained for comparison runs against
/// [`WeightAdamW`].
pub struct WeightAdamWLegacy {
    groups: Vec<ParamGroup>,
    config: WeightAdamWLegacyConfig,
    state: HashMap<ParamId, MomentState>,
    approx: GateProjection,
    proj: MaskProjection,
}

impl WeightAdamWLegacy {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(groups: Vec<ParamGroup>, config: WeightAdamWLegacyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            groups,
            config,
            state: HashMap::new(),
            approx: top_values_mask,
            proj: apply_mask,
        })
    }

    /// Replace the support-selection / projection operator pair.
    #[must_use]
    pub fn with_operators(mut self, approx: GateProjection, proj: MaskProjection) -> Self {
        self.approx = approx;
        self.proj = proj;
        self
    }
}

impl Optimizer for WeightAdamWLegacy {
    fn step(&mut self) -> Result<()> {
        let Self {
            groups,
            config,
            state,
            approx,
            proj,
        } = self;

        for group in groups.iter() {
            let lr = group.lr.unwrap_or(config.adam.lr);
            let weight_decay = group.weight_decay.unwrap_or(config.adam.weight_decay);

            let mut gate_values = Vec::new();
            let mut gate_grads = Vec::new();
            let mut gate_params = Vec::new();
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                if param.dims() == [1] {
                    gate_values.push(param.item()?);
                    gate_grads.push(scalar_of(&grad)?);
                    gate_params.push(param.clone());
                    continue;
                }
                let entry = moment_entry(state, param)?;
                adam_update(param, &grad, entry, lr, &config.adam, weight_decay)?;
            }

            let norm = gate_grads
                .iter()
                .map(|g| f64::from(*g) * f64::from(*g))
                .sum::<f64>()
                .sqrt();
            if norm > 0.0 {
                let device = gate_params[0].value().device().clone();
                let n = gate_values.len();
                let values = Tensor::from_vec(gate_values, (n,), &device)?;
                let grads = Tensor::from_vec(gate_grads, (n,), &device)?;
                let iterate = (values - (grads * lr)?)?;
                let support = (*approx)(&iterate, config.k)?;
                let projected = (*proj)(&iterate, &support)?.to_vec1::<f32>()?;
                for (j, param) in gate_params.iter().enumerate() {
                    param.set_value(Tensor::from_vec(vec![projected[j]], (1,), &device)?)?;
                }
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.adam.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.adam.lr = lr;
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.clear_grad();
            }
        }
    }
}
