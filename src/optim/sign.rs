//! Sign-compressed optimizers.
//!
//! Both variants replace the raw gradient by its elementwise sign before
//! updating, trading gradient magnitude for a one-bit-per-coordinate
//! communication footprint. Exact-zero gradients are randomized to ±1 so
//! the applied sign is never zero.
//!
//! Reference: <https://arxiv.org/abs/1802.04434>

use std::collections::HashMap;

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::AdamParams;
use crate::error::{OptimError, Result};
use crate::optim::{adam_update, moment_entry, MomentState};
use crate::param::{GroupRole, ParamGroup, ParamId, Parameter};
use crate::traits::{OptimConfig, Optimizer};

/// Elementwise sign with zeros randomized to ±1 when `rand_zero` is set.
fn sign_with_random_zeros(grad: &Tensor, rand_zero: bool, rng: &mut StdRng) -> Result<Tensor> {
    let dims = grad.dims().to_vec();
    let values = grad.flatten_all()?.to_vec1::<f32>()?;
    let signs: Vec<f32> = values
        .iter()
        .map(|&g| {
            if g > 0.0 {
                1.0
            } else if g < 0.0 {
                -1.0
            } else if rand_zero {
                if rng.gen::<bool>() {
                    1.0
                } else {
                    -1.0
                }
            } else {
                0.0
            }
        })
        .collect();
    let n = signs.len();
    Ok(Tensor::from_vec(signs, (n,), grad.device())?.reshape(dims)?)
}

/// SGD along the gradient sign: `p -= lr * sign(grad)`.
pub struct SignSgd {
    groups: Vec<ParamGroup>,
    lr: f64,
    rand_zero: bool,
    rng: StdRng,
}

impl SignSgd {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if `lr` is negative.
    pub fn new(groups: Vec<ParamGroup>, lr: f64, rand_zero: bool) -> Result<Self> {
        if lr < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid learning rate: {lr}"
            )));
        }
        Ok(Self {
            groups,
            lr,
            rand_zero,
            rng: StdRng::from_entropy(),
        })
    }

    /// Seed the zero-sign randomization for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Optimizer for SignSgd {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.lr);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                let sign = sign_with_random_zeros(&grad, self.rand_zero, &mut self.rng)?;
                param.set_value((param.value() - (&sign * lr)?)?)?;
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

/// AdamW driven by the gradient sign instead of the raw gradient.
pub struct SignAdamW {
    groups: Vec<ParamGroup>,
    params: AdamParams,
    rand_zero: bool,
    state: HashMap<ParamId, MomentState>,
    rng: StdRng,
}

impl SignAdamW {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the hyperparameters are invalid.
    pub fn new(groups: Vec<ParamGroup>, params: AdamParams, rand_zero: bool) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            groups,
            params,
            rand_zero,
            state: HashMap::new(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Create an optimizer over a plain parameter list (a single group).
    ///
    /// # Errors
    ///
    /// Returns an error if the hyperparameters are invalid.
    pub fn from_parameters(parameters: Vec<Parameter>, params: AdamParams) -> Result<Self> {
        Self::new(
            vec![ParamGroup::new(GroupRole::Other, parameters)],
            params,
            true,
        )
    }

    /// Seed the zero-sign randomization for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Step count recorded for a parameter, if it has been touched.
    #[must_use]
    pub fn state_step(&self, param: &Parameter) -> Option<usize> {
        self.state.get(&param.id()).map(|s| s.step)
    }
}

impl Optimizer for SignAdamW {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.params.lr);
            let weight_decay = group.weight_decay.unwrap_or(self.params.weight_decay);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                let sign = sign_with_random_zeros(&grad, self.rand_zero, &mut self.rng)?;
                let state = moment_entry(&mut self.state, param)?;
                adam_update(param, &sign, state, lr, &self.params, weight_decay)?;
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

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device, Tensor};

    use super::*;

    #[test]
    fn test_sign_never_zero_with_rand_zero() {
        let device = Device::Cpu;
        let grad = Tensor::from_vec(vec![0.0f32, 2.0, -3.0, 0.0], (4,), &device).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let sign = sign_with_random_zeros(&grad, true, &mut rng)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        for s in &sign {
            assert!(*s == 1.0 || *s == -1.0, "sign {s}");
        }
        assert_eq!(sign[1], 1.0);
        assert_eq!(sign[2], -1.0);
    }

    #[test]
    fn test_sign_keeps_zero_without_rand_zero() {
        let device = Device::Cpu;
        let grad = Tensor::from_vec(vec![0.0f32, 1.0], (2,), &device).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let sign = sign_with_random_zeros(&grad, false, &mut rng)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(sign, vec![0.0, 1.0]);
    }

    #[test]
    fn test_sign_sgd_moves_every_coordinate_by_lr() {
        let device = Device::Cpu;
        let p = Parameter::new(Tensor::zeros((4,), DType::F32, &device).unwrap());
        let group = ParamGroup::new(GroupRole::Other, vec![p.clone()]);
        let mut optimizer = SignSgd::new(vec![group], 0.25, true).unwrap().with_seed(3);
        p.set_grad(Tensor::from_vec(vec![0.5f32, -0.5, 0.0, 0.0], (4,), &device).unwrap())
            .unwrap();
        optimizer.step().unwrap();
        for v in p.value().to_vec1::<f32>().unwrap() {
            assert!((v.abs() - 0.25).abs() < 1e-7, "coordinate moved by {v}");
        }
    }

    #[test]
    fn test_sign_adamw_moves_zero_gradient_coordinates() {
        let device = Device::Cpu;
        let p = Parameter::new(Tensor::zeros((3,), DType::F32, &device).unwrap());
        let mut optimizer =
            SignAdamW::from_parameters(vec![p.clone()], AdamParams::with_lr(0.01))
                .unwrap()
                .with_seed(11);
        p.set_grad(Tensor::from_vec(vec![0.0f32, 1.0, -1.0], (3,), &device).unwrap())
            .unwrap();
        optimizer.step().unwrap();
        assert_eq!(optimizer.state_step(&p), Some(1));
        for v in p.value().to_vec1::<f32>().unwrap() {
            assert!(v != 0.0, "coordinate left unmoved");
        }
    }
}
