//! SGD over compressed gradients.
//!
//! Wraps a [`GradSparsifier`] around each parameter's gradient, descending
//! along the sparsified, rescaled estimate instead of the dense gradient.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::compress::{CoordinateBias, GradSparsifier, SparsifierConfig};
use crate::error::{OptimError, Result};
use crate::param::{GroupRole, ParamGroup, ParamId, Parameter};
use crate::traits::{OptimConfig, Optimizer};

/// Configuration for [`Qsgd`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QsgdConfig {
    /// Learning rate.
    pub lr: f64,
    /// Coordinate-selection bias; `None` disables compression entirely.
    pub compression: Option<CoordinateBias>,
    /// Settings shared by every per-parameter sparsifier.
    #[serde(default)]
    pub sparsifier: SparsifierConfig,
}

impl OptimConfig for QsgdConfig {
    fn validate(&self) -> Result<()> {
        if self.lr < 0.0 {
            return Err(OptimError::InvalidConfig(format!(
                "invalid learning rate: {}",
                self.lr
            )));
        }
        if self.compression.is_some() {
            self.sparsifier.validate()?;
        }
        Ok(())
    }
}

/// SGD with per-parameter gradient compression.
///
/// Sparsifiers are instantiated lazily, one per parameter, the first time
/// that parameter carries a gradient.
pub struct Qsgd {
    groups: Vec<ParamGroup>,
    config: QsgdConfig,
    compressors: HashMap<ParamId, GradSparsifier>,
}

impl Qsgd {
    /// Create an optimizer over the given parameter groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(groups: Vec<ParamGroup>, config: QsgdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            groups,
            config,
            compressors: HashMap::new(),
        })
    }

    /// Create an optimizer over a plain parameter list (a single group).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_parameters(parameters: Vec<Parameter>, config: QsgdConfig) -> Result<Self> {
        Self::new(vec![ParamGroup::new(GroupRole::Other, parameters)], config)
    }
}

impl Optimizer for Qsgd {
    fn step(&mut self) -> Result<()> {
        for group in &self.groups {
            let lr = group.lr.unwrap_or(self.config.lr);
            for param in &group.params {
                let Some(grad) = param.grad() else { continue };
                let grad = match self.config.compression {
                    None => grad,
                    Some(bias) => {
                        if !self.compressors.contains_key(&param.id()) {
                            let mut sparsifier_config = self.config.sparsifier.clone();
                            // Derive a distinct stream per parameter from the base seed.
                            if let Some(seed) = sparsifier_config.seed {
                                sparsifier_config.seed =
                                    Some(seed.wrapping_add(self.compressors.len() as u64));
                            }
                            self.compressors
                                .insert(param.id(), GradSparsifier::new(bias, sparsifier_config)?);
                        }
                        let compressor =
                            self.compressors.get_mut(&param.id()).ok_or_else(|| {
                                OptimError::DimensionMismatch {
                                    message: "compressor lookup failed after insertion"
                                        .to_string(),
                                }
                            })?;
                        compressor.compress(&grad)?
                    }
                };
                param.set_value((param.value() - (&grad * lr)?)?)?;
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
