//! Stochastic iterative hard thresholding.
//!
//! Each step takes a plain descent iterate and, with probability `prob`,
//! projects it onto the set of `k`-sparse tensors by keeping its top-`k`
//! entries.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, Result};
use crate::param::{GroupRole, ParamGroup, Parameter};
use crate::proj::{apply_mask, top_values_mask, GateProjection, MaskProjection};
use crate::traits::{OptimConfig, Optimizer};

/// Configuration for [`StoIht`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoIhtConfig {
    /// Learning rate.
    pub lr: f64,
    /// Sparsity target: number of entries kept by the projection.
    pub k: usize,
    /// Probability of applying the projection on a given step.
    pub prob: f64,
    /// RNG seed; `None` seeds from the system.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl OptimConfig for StoIhtConfig {
    fn validate(&self) -> Result<()> {
        if self.lr < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid learning rate: {}",
                self.lr
            )));
        }
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(OptimError::InvalidConfig(format!(
                "projection probability must be in [0, 1], got {}",
                self.prob
            )));
        }
        Ok(())
    }
}

/// SGD with Bernoulli-gated hard-thresholding projection.
pub struct StoIht {
    groups: Vec<ParamGroup>,
    config: StoIhtConfig,
    approx: GateProjection,
    proj: MaskProjection,
    rng: StdRng,
}

impl StoIht {
    /// Create an optimizer over the given parameter groups.
    ///
    /// Uses the top-values mask and elementwise mask application as the
    /// default support/projection pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(groups: Vec<ParamGroup>, config: StoIhtConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            groups,
            config,
            approx: top_values_mask,
            proj: apply_mask,
            rng,
        })
    }

    /// Create an optimizer over a plain parameter list (a single group).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_parameters(parameters: Vec<Parameter>, config: StoIhtConfig) -> Result<Self> {
        Self::new(vec![ParamGroup::new(GroupRole::Other, parameters)], config)
    }

    /// Replace the support-selection / projection operator pair.
    #[must_use]
    pub fn with_operators(mut self, approx: GateProjection, proj: MaskProjection) -> Self {
        self.approx = approx;
        self.proj = proj;
        self
    }
}

impl Optimizer for StoIht {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.config.lr);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                let iterate = (param.value() - (&grad * lr)?)?;
                if self.rng.gen::<f64>() < self.config.prob {
                    let support = (self.approx)(&iterate, self.config.k)?;
                    param.set_value((self.proj)(&iterate, &support)?)?;
                } else {
                    param.set_value(iterate)?;
                }
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.lr = lr;
    }

    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.clear_grad();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};

    use super::*;

    fn config(k: usize, prob: f64) -> StoIhtConfig {
        StoIhtConfig {
            lr: 0.1,
            k,
            prob,
            seed: Some(5),
        }
    }

    #[test]
    fn test_prob_validation() {
        let mut cfg = config(2, 1.5);
        assert!(cfg.validate().is_err());
        cfg.prob = 0.5;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_prob_zero_is_plain_descent() {
        let device = Device::Cpu;
        let p = Parameter::new(Tensor::from_vec(vec![1.0f32, 2.0], (2,), &device).unwrap());
        let mut optimizer = StoIht::from_parameters(vec![p.clone()], config(1, 0.0)).unwrap();
        p.set_grad(Tensor::from_vec(vec![1.0f32, 1.0], (2,), &device).unwrap())
            .unwrap();
        optimizer.step().unwrap();
        let values = p.value().to_vec1::<f32>().unwrap();
        assert!((values[0] - 0.9).abs() < 1e-6);
        assert!((values[1] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_prob_one_projects_to_k_sparse() {
        let device = Device::Cpu;
        let p = Parameter::new(
            Tensor::from_vec(vec![5.0f32, 1.0, 3.0, 2.0], (4,), &device).unwrap(),
        );
        let mut optimizer = StoIht::from_parameters(vec![p.clone()], config(2, 1.0)).unwrap();
        p.set_grad(Tensor::zeros((4,), candle_core::DType::F32, &device).unwrap())
            .unwrap();
        optimizer.step().unwrap();
        let values = p.value().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![5.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_projection_applies_to_matrices() {
        let device = Device::Cpu;
        let p = Parameter::new(
            Tensor::from_vec(vec![4.0f32, 1.0, 2.0, 3.0], (2, 2), &device).unwrap(),
        );
        let mut optimizer = StoIht::from_parameters(vec![p.clone()], config(2, 1.0)).unwrap();
        p.set_grad(Tensor::zeros((2, 2), candle_core::DType::F32, &device).unwrap())
            .unwrap();
        optimizer.step().unwrap();
        let values = p
            .value()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(values, vec![4.0, 0.0, 0.0, 3.0]);
    }
}
