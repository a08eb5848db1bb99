//! Adam with decoupled weight decay.
//!
//! Reference: <https://arxiv.org/abs/1711.05101>

use std::collections::HashMap;

use crate::config::AdamParams;
use crate::error::Result;
use crate::optim::{adam_update, moment_entry, MomentState};
use crate::param::{GroupRole, ParamGroup, ParamId, Parameter};
use crate::traits::{OptimConfig, Optimizer};

/// AdamW optimizer applied uniformly across all parameter groups.
pub struct AdamW {
    groups: Vec<ParamGroup>,
    params: AdamParams,
    state: HashMap<ParamId, MomentState>,
}

impl AdamW {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the hyperparameters are invalid.
    pub fn new(groups: Vec<ParamGroup>, params: AdamParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            groups,
            params,
            state: HashMap::new(),
        })
    }

    /// Create an optimizer over a plain parameter list (a single group).
    ///
    /// # Errors
    ///
    /// Returns an error if the hyperparameters are invalid.
    pub fn from_parameters(parameters: Vec<Parameter>, params: AdamParams) -> Result<Self> {
        Self::new(vec![ParamGroup::new(GroupRole::Other, parameters)], params)
    }

    /// Step count recorded for a parameter, if it has been touched.
    #[must_use]
    pub fn state_step(&self, param: &Parameter) -> Option<usize> {
        self.state.get(&param.id()).map(|s| s.step)
    }
}

impl Optimizer for AdamW {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.params.lr);
            let weight_decay = group.weight_decay.unwrap_or(self.params.weight_decay);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                let state = moment_entry(&mut self.state, param)?;
                adam_update(param, &grad, state, lr, &self.params, weight_decay)?;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.clear_grad();
            }
        }
    }
}
