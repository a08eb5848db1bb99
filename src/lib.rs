//! # lora-optim-rs
//!
//! Structured-sparsity and adaptive-rank optimizers for LoRA fine-tuning.
//!
//! This crate provides a family of stateful gradient-based optimizers for
//! parameter-efficient fine-tuning:
//! - **Base rules**: [`Sgd`], [`AdamW`], the sign-compressed [`SignSgd`] and
//!   [`SignAdamW`], the hard-thresholding [`StoIht`], and the
//!   gradient-compressing [`Qsgd`]
//! - **Gated rules**: [`WeightAdamW`], which keeps only the top-`k` adapter
//!   gates active, and [`FatAdamW`], which additionally grows adapter rank
//!   and prunes the active set on a periodic schedule
//! - **Building blocks**: top-value projections ([`keep_top_values`]),
//!   randomized gradient sparsifiers ([`GradSparsifier`]), and learning
//!   rate schedules ([`LrSchedule`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candle_core::{Device, Tensor};
//! use lora_optim_rs::{
//!     AdamParams, GroupRole, Optimizer, ParamGroup, Parameter, WeightAdamW,
//!     WeightAdamWConfig,
//! };
//!
//! let device = Device::Cpu;
//!
//! // One scalar gate per adapter, plus the dense trainable tensors.
//! let gates: Vec<Parameter> = (0..4)
//!     .map(|_| Parameter::scalar(1.0, &device))
//!     .collect::<Result<_, _>>()?;
//! let dense = Parameter::new(Tensor::zeros((64, 64), candle_core::DType::F32, &device)?);
//!
//! let groups = vec![
//!     ParamGroup::new(GroupRole::Other, vec![dense]),
//!     ParamGroup::new(GroupRole::Gates, gates).with_k(2),
//! ];
//! let mut optimizer = WeightAdamW::new(groups, WeightAdamWConfig::default())?;
//!
//! // Training loop: populate gradients, then step.
//! optimizer.step()?;
//! ```
//!
//! ## Architecture
//!
//! Parameters are caller-owned; the optimizer receives cloned [`Parameter`]
//! handles and mutates values through them. Groups carry a closed
//! [`GroupRole`] deciding which update track applies, and all update rules
//! run as one synchronous pass per [`Optimizer::step`] call.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod compress;
pub mod config;
pub mod error;
pub mod optim;
pub mod param;
pub mod proj;
pub mod schedule;
pub mod traits;

pub use compress::{CoordinateBias, GradSparsifier, ProbProjection, SparsifierConfig};
pub use config::AdamParams;
pub use error::{OptimError, Result};
pub use optim::{
    AdamW, FatAdamW, FatAdamWConfig, GateSnapshot, Qsgd, QsgdConfig, RankExtension, Sgd,
    SignAdamW, SignSgd, StoIht, StoIhtConfig, WeightAdamW, WeightAdamWConfig, WeightAdamWLegacy,
    WeightAdamWLegacyConfig,
};
pub use param::{GroupRole, ParamGroup, ParamId, Parameter};
pub use proj::{apply_mask, keep_top_values, top_values_mask, GateProjection, MaskProjection};
pub use schedule::LrSchedule;
pub use traits::{OptimConfig, Optimizer};
