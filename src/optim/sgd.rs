//! Plain stochastic gradient descent.

use crate::error::{OptimError, Result};
use crate::param::{GroupRole, ParamGroup, Parameter};
use crate::traits::Optimizer;

/// Stateless SGD: `p -= lr * grad`.
pub struct Sgd {
    groups: Vec<ParamGroup>,
    lr: f64,
}

impl Sgd {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is negative.
    pub fn new(groups: Vec<ParamGroup>, lr: f64) -> Result<Self> {
        if lr < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid learning rate: {lr}"
            )));
        }
        Ok(Self { groups, lr })
    }

    /// Create an optimizer over a plain parameter list (a single group).
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is negative.
    pub fn from_parameters(parameters: Vec<Parameter>, lr: f64) -> Result<Self> {
        Self::new(vec![ParamGroup::new(GroupRole::Other, parameters)], lr)
    }
}

impl Optimizer for Sgd {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.lr);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                param.set_value((param.value() - (&grad * lr)?)?)?;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.clear_grad();
            }
        }
    }
}
