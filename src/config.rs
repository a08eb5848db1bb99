//! Shared hyperparameter blocks for the optimizer family.

use serde::{Deserialize, Serialize};

use crate::error::{OptimError, Result};
use crate::traits::OptimConfig;

/// Adam-style hyperparameters shared by the adaptive optimizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamParams {
    /// Learning rate.
    pub lr: f64,

    /// Exponential decay rate for the first moment estimate.
    #[serde(default = "default_beta1")]
    pub beta1: f64,

    /// Exponential decay rate for the second moment estimate.
    #[serde(default = "default_beta2")]
    pub beta2: f64,

    /// Epsilon added to the denominator for numerical stability.
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Decoupled weight decay coefficient.
    #[serde(default)]
    pub weight_decay: f64,

    /// Whether to bias-correct the moment estimates (BERT-style runs disable this).
    #[serde(default = "default_correct_bias")]
    pub correct_bias: bool,
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-6
}

fn default_correct_bias() -> bool {
    true
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            weight_decay: 0.0,
            correct_bias: default_correct_bias(),
        }
    }
}

impl AdamParams {
    /// Build a parameter block with the given learning rate and defaults elsewhere.
    #[must_use]
    pub fn with_lr(lr: f64) -> Self {
        Self {
            lr,
            ..Self::default()
        }
    }
}

impl OptimConfig for AdamParams {
    fn validate(&self) -> Result<()> {
        if self.lr < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid learning rate: {} - should be >= 0.0",
                self.lr
            )));
        }
        if !(0.0..1.0).contains(&self.beta1) {
            return Err(OptimError::InvalidConfig(format!(
                "invalid beta parameter: {} - should be in [0.0, 1.0)",
                self.beta1
            )));
        }
        if !(0.0..1.0).contains(&self.beta2) {
            return Err(OptimError::InvalidConfig(format!(
                "invalid beta parameter: {} - should be in [0.0, 1.0)",
                self.beta2
            )));
        }
        if self.eps < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid epsilon value: {} - should be >= 0.0",
                self.eps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        let params = AdamParams::default();
        assert!(params.validate().is_ok());
        assert!((params.lr - 1e-3).abs() < 1e-12);
        assert!(params.correct_bias);
    }

    #[test]
    fn test_negative_lr_rejected() {
        let params = AdamParams::with_lr(-0.1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_beta_out_of_range_rejected() {
        let params = AdamParams {
            beta1: 1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = AdamParams {
            beta2: -0.1,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_negative_eps_rejected() {
        let params = AdamParams {
            eps: -1e-8,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
