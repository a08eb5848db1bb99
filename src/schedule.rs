//! Learning rate schedules for driving the optimizers.
//!
//! Schedules are pure functions of the global step; pair them with
//! [`Optimizer::set_learning_rate`](crate::traits::Optimizer::set_learning_rate)
//! through [`LrSchedule::schedule`].

#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::traits::Optimizer;

/// Learning rate schedule strategies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Constant learning rate.
    #[default]
    Constant,
    /// Linear warmup from 0 to the base rate.
    WarmupLinear {
        /// Number of warmup steps.
        warmup_steps: usize,
    },
    /// Cosine annealing from the base rate down to `min_lr`.
    Cosine {
        /// Total number of steps.
        total_steps: usize,
        /// Minimum learning rate.
        min_lr: f64,
    },
    /// Linear warmup followed by inverse square-root decay.
    InverseSqrt {
        /// Number of warmup steps; also the decay timescale.
        warmup_steps: usize,
    },
}

impl LrSchedule {
    /// Compute the learning rate for the given step.
    #[must_use]
    pub fn lr_at(&self, step: usize, base_lr: f64) -> f64 {
        match self {
            Self::Constant => base_lr,
            Self::WarmupLinear { warmup_steps } => {
                if *warmup_steps == 0 || step >= *warmup_steps {
                    base_lr
                } else {
                    base_lr * (step as f64 / *warmup_steps as f64)
                }
            }
            Self::Cosine {
                total_steps,
                min_lr,
            } => {
                if *total_steps == 0 || step >= *total_steps {
                    *min_lr
                } else {
                    let progress = step as f64 / *total_steps as f64;
                    let cosine_decay = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                    min_lr + (base_lr - min_lr) * cosine_decay
                }
            }
            Self::InverseSqrt { warmup_steps } => {
                let timescale = (*warmup_steps).max(1);
                if step < *warmup_steps {
                    base_lr * (step as f64 / *warmup_steps as f64)
                } else {
                    base_lr * (timescale as f64 / step.max(timescale) as f64).sqrt()
                }
            }
        }
    }

    /// Push this schedule's rate for `step` into an optimizer.
    pub fn schedule<O: Optimizer>(&self, optimizer: &mut O, step: usize, base_lr: f64) {
        optimizer.set_learning_rate(self.lr_at(step, base_lr));
    }
}
