//! Randomized gradient sparsifiers.
//!
//! A sparsifier keeps a random subset of gradient coordinates each step and
//! rescales the survivors so the compressed gradient stays an unbiased
//! estimator of the dense one. The selection distribution can be biased
//! against coordinates drawn in recent steps, spreading updates across the
//! parameter over time.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use std::sync::Arc;

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, Result};
use crate::traits::OptimConfig;

/// Re-normalization applied to sampling weights before drawing.
///
/// Only consulted by [`CoordinateBias::FrequencyPenalty`].
pub type ProbProjection = Arc<dyn Fn(&Tensor) -> Result<Tensor> + Send + Sync>;

/// How sampling weight is assigned to each coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateBias {
    /// Uniform weights: plain random subsampling.
    Uniform,
    /// Zero weight on recently drawn coordinates. Falls back to uniform
    /// weights when the ban would empty the distribution.
    BanRecent,
    /// Weight `b^-c` where `c` counts the coordinate's draws still in the
    /// history, exponentially down-weighting frequently used coordinates.
    FrequencyPenalty,
}

/// Configuration for [`GradSparsifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparsifierConfig {
    /// Fraction of coordinates kept per step, in `(0, 1]`.
    pub compression_rate: f64,

    /// History length cap, as a multiple of the per-step sample size.
    #[serde(default = "default_history_factor")]
    pub history_factor: usize,

    /// Penalty base `b` for [`CoordinateBias::FrequencyPenalty`].
    #[serde(default = "default_penalty_base")]
    pub penalty_base: f64,

    /// RNG seed; `None` seeds from the system.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_history_factor() -> usize {
    7
}

fn default_penalty_base() -> f64 {
    2.0
}

impl Default for SparsifierConfig {
    fn default() -> Self {
        Self {
            compression_rate: 0.1,
            history_factor: default_history_factor(),
            penalty_base: default_penalty_base(),
            seed: None,
        }
    }
}

impl OptimConfig for SparsifierConfig {
    fn validate(&self) -> Result<()> {
        if !(self.compression_rate > 0.0 && self.compression_rate <= 1.0) {
            return Err(OptimError::InvalidConfig(format!(
                "compression rate must be in (0, 1], got {}",
                self.compression_rate
            )));
        }
        if self.penalty_base <= 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "penalty base must be positive, got {}",
                self.penalty_base
            )));
        }
        Ok(())
    }
}

/// Stateful sampler that zeroes a random subset of gradient coordinates.
pub struct GradSparsifier {
    bias: CoordinateBias,
    config: SparsifierConfig,
    /// Effective history cap multiplier; uniform sampling keeps no history.
    history_cap: usize,
    /// Flat indices drawn in recent steps, newest first.
    used_coordinates: Vec<usize>,
    prob_projection: Option<ProbProjection>,
    rng: StdRng,
}

impl GradSparsifier {
    /// Create a sparsifier with the given bias and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(bias: CoordinateBias, config: SparsifierConfig) -> Result<Self> {
        config.validate()?;
        let history_cap = match bias {
            CoordinateBias::Uniform => 0,
            CoordinateBias::BanRecent | CoordinateBias::FrequencyPenalty => config.history_factor,
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            bias,
            config,
            history_cap,
            used_coordinates: Vec::new(),
            prob_projection: None,
            rng,
        })
    }

    /// Attach a re-normalizing projection to the sampling weights.
    #[must_use]
    pub fn with_prob_projection(mut self, projection: ProbProjection) -> Self {
        self.prob_projection = Some(projection);
        self
    }

    /// Flat indices drawn in recent steps, newest first.
    #[must_use]
    pub fn used_coordinates(&self) -> &[usize] {
        &self.used_coordinates
    }

    /// Sampling weights over the flattened coordinates of `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor operation or the probability projection
    /// fails.
    pub fn sampling_probs(&self, x: &Tensor) -> Result<Tensor> {
        let n = x.elem_count();
        let weights = match self.bias {
            CoordinateBias::Uniform => vec![1.0f32; n],
            CoordinateBias::BanRecent => {
                let mut weights = vec![1.0f32; n];
                for &i in &self.used_coordinates {
                    if i < n {
                        weights[i] = 0.0;
                    }
                }
                if weights.iter().sum::<f32>() == 0.0 {
                    weights = vec![1.0f32; n];
                }
                weights
            }
            CoordinateBias::FrequencyPenalty => {
                let mut counts = vec![0u32; n];
                for &i in &self.used_coordinates {
                    if i < n {
                        counts[i] += 1;
                    }
                }
                counts
                    .iter()
                    .map(|&c| (1.0 / self.config.penalty_base.powi(c as i32)) as f32)
                    .collect()
            }
        };
        let probs = Tensor::from_vec(weights, (n,), x.device())?;
        match (&self.bias, &self.prob_projection) {
            (CoordinateBias::FrequencyPenalty, Some(projection)) => projection(&probs),
            _ => Ok(probs),
        }
    }

    /// Compress a gradient: keep `ceil(rate * n)` randomly selected
    /// coordinates scaled by `1/rate`, zero the rest.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampling distribution runs out of nonzero
    /// weights before the requested number of draws.
    pub fn compress(&mut self, x: &Tensor) -> Result<Tensor> {
        let dims = x.dims().to_vec();
        let n = x.elem_count();
        let m = (self.config.compression_rate * n as f64).ceil() as usize;

        let mut weights: Vec<f64> = self
            .sampling_probs(x)?
            .to_vec1::<f32>()?
            .iter()
            .map(|&w| f64::from(w))
            .collect();
        let drawn = self.draw_without_replacement(&mut weights, m)?;

        let mut values = x.flatten_all()?.to_vec1::<f32>()?;
        let mut keep = vec![false; n];
        for &i in &drawn {
            keep[i] = true;
        }
        let scale = (1.0 / self.config.compression_rate) as f32;
        for (i, value) in values.iter_mut().enumerate() {
            *value = if keep[i] { *value * scale } else { 0.0 };
        }

        let mut history = drawn;
        history.append(&mut self.used_coordinates);
        history.truncate(self.history_cap * m);
        self.used_coordinates = history;

        Ok(Tensor::from_vec(values, (n,), x.device())?.reshape(dims)?)
    }

    fn draw_without_replacement(
        &mut self,
        weights: &mut [f64],
        m: usize,
    ) -> Result<Vec<usize>> {
        let mut drawn = Vec::with_capacity(m);
        for _ in 0..m {
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                return Err(OptimError::Sampling(format!(
                    "needed {m} coordinates but the distribution ran out of weight"
                )));
            }
            let mut t = self.rng.gen_range(0.0..total);
            let mut pick = None;
            let mut last_nonzero = None;
            for (i, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                last_nonzero = Some(i);
                if t < w {
                    pick = Some(i);
                    break;
                }
                t -= w;
            }
            // Rounding can walk past the final bucket.
            let pick = pick.or(last_nonzero).ok_or_else(|| {
                OptimError::Sampling("empty sampling distribution".to_string())
            })?;
            drawn.push(pick);
            weights[pick] = 0.0;
        }
        Ok(drawn)
    }
}
