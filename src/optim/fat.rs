//! Gated AdamW with periodic adapter-rank growth.
//!
//! On top of the two-track gated update, every `fat_step` steps the
//! optimizer doubles the rank of the LoRA factor pairs that are still
//! active, and (on an independent counter) halves the gate budget `k`,
//! pruning the active adapter set. Both mechanics stop once the growth
//! budget is spent.

use std::collections::{BTreeSet, HashMap};

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AdamParams;
use crate::error::{OptimError, Result};
use crate::optim::{adam_update, moment_entry, MomentState};
use crate::param::{GroupRole, ParamGroup, ParamId, Parameter};
use crate::traits::{OptimConfig, Optimizer};

/// Strategy used to extend a LoRA factor pair when its rank is doubled.
///
/// The factor whose smaller axis is its second axis is treated as the "A"
/// factor of the pair; its partner is "B".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankExtension {
    /// A gains uniform-random columns, B gains zero rows.
    Random,
    /// A is QR-decomposed and extended with the orthogonal complement of a
    /// random block against Q; the R block is premultiplied into the next
    /// B factor before it is zero-padded.
    Orthogonal,
    /// Both halves are reinitialized: A from two random blocks, B to zeros.
    Restart,
}

/// Configuration for [`FatAdamW`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatAdamWConfig {
    /// Adam hyperparameters for the dense track.
    pub adam: AdamParams,
    /// Number of adapters; also the initial gate budget `k`.
    pub num_adapters: usize,
    /// Rank-extension strategy.
    pub extension: RankExtension,
    /// Period, in steps, of both growth and pruning.
    pub fat_step: usize,
    /// Budget of growth/pruning events.
    pub max_fat_steps: i64,
}

impl Default for FatAdamWConfig {
    fn default() -> Self {
        Self {
            adam: AdamParams::default(),
            num_adapters: 36,
            extension: RankExtension::Random,
            fat_step: 10,
            max_fat_steps: 3,
        }
    }
}

impl OptimConfig for FatAdamWConfig {
    fn validate(&self) -> Result<()> {
        self.adam.validate()?;
        if self.fat_step == 0 {
            return Err(OptimError::InvalidConfig(
                "fat_step must be at least 1".to_string(),
            ));
        }
        if self.num_adapters == 0 {
            return Err(OptimError::InvalidConfig(
                "num_adapters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only view of the pruning state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Indices of adapters whose gate is currently active.
    pub chosen_layers: Vec<usize>,
    /// Current gate budget.
    pub k: usize,
    /// Remaining growth/pruning events; −1 once permanently disabled.
    pub fat_budget: i64,
}

/// Gated AdamW with adaptive adapter rank.
///
/// Groups are processed in construction order each step, so the relative
/// order of the gate group and the factor group decides when a spent
/// budget takes effect within a step.
pub struct FatAdamW {
    groups: Vec<ParamGroup>,
    config: FatAdamWConfig,
    state: HashMap<ParamId, MomentState>,
    chosen_layers: BTreeSet<usize>,
    k: usize,
    fat_budget: i64,
    gate_steps: usize,
    /// R block held from the most recent A-factor growth.
    pending_r: Option<Tensor>,
}

impl FatAdamW {
    /// Create an optimizer over the given parameter groups.
    ///
    /// All adapters start chosen and the gate budget starts at
    /// `num_adapters`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(groups: Vec<ParamGroup>, config: FatAdamWConfig) -> Result<Self> {
        config.validate()?;
        let chosen_layers = (0..config.num_adapters).collect();
        let k = config.num_adapters;
        let fat_budget = config.max_fat_steps;
        Ok(Self {
            groups,
            config,
            state: HashMap::new(),
            chosen_layers,
            k,
            fat_budget,
            gate_steps: 0,
            pending_r: None,
        })
    }

    /// Read-only snapshot of the pruning state machine.
    #[must_use]
    pub fn gate_state(&self) -> GateSnapshot {
        GateSnapshot {
            chosen_layers: self.chosen_layers.iter().copied().collect(),
            k: self.k,
            fat_budget: self.fat_budget,
        }
    }

    /// Step count recorded for a parameter, if it has been touched.
    #[must_use]
    pub fn state_step(&self, param: &Parameter) -> Option<usize> {
        self.state.get(&param.id()).map(|s| s.step)
    }
}

impl Optimizer for FatAdamW {
    fn step(&mut self) -> Result<()> {
        let Self {
            groups,
            config,
            state,
            chosen_layers,
            k,
            fat_budget,
            gate_steps,
            pending_r,
        } = self;

        for group in groups.iter() {
            match group.role {
                GroupRole::Gates => {
                    // A budget sitting at exactly zero flips to the −1
                    // sentinel here, permanently disabling pruning and,
                    // from the next growth check on, rank growth.
                    if *fat_budget == 0 {
                        *fat_budget = -1;
                    }
                    if *fat_budget > 0 {
                        let lr = group.lr.unwrap_or(config.adam.lr);
                        *gate_steps += 1;
                        let prune_due = *gate_steps % config.fat_step == 0;

                        let mut gate_values = Vec::new();
                        let mut touched = Vec::new();
                        for (i, param) in group.params.iter().enumerate() {
                            let Some(grad) = param.grad() else { continue };
                            if !chosen_layers.contains(&i) {
                                continue;
                            }
                            param.set_value((param.value() - (&grad * lr)?)?)?;
                            if prune_due {
                                gate_values.push(param.item()?);
                                touched.push(i);
                            }
                        }

                        if prune_due {
                            *k /= 2;
                            *fat_budget -= 1;
                            if !touched.is_empty() {
                                let device =
                                    group.params[touched[0]].value().device().clone();
                                let vector = Tensor::from_vec(
                                    gate_values,
                                    (touched.len(),),
                                    &device,
                                )?;
                                let projected =
                                    (group.proj)(&vector, *k)?.to_vec1::<f32>()?;
                                let mut next_chosen = BTreeSet::new();
                                for (j, &i) in touched.iter().enumerate() {
                                    if projected[j] > 0.0 {
                                        next_chosen.insert(i);
                                    }
                                    group.params[i].set_value(Tensor::from_vec(
                                        vec![projected[j]],
                                        (1,),
                                        &device,
                                    )?)?;
                                }
                                *chosen_layers = next_chosen;
                                debug!(
                                    k = *k,
                                    budget = *fat_budget,
                                    chosen = ?chosen_layers,
                                    "pruned adapter gates"
                                );
                            }
                        }
                    }
                }
                GroupRole::LoraFactors | GroupRole::Other => {
                    let lr = group.lr.unwrap_or(config.adam.lr);
                    let weight_decay =
                        group.weight_decay.unwrap_or(config.adam.weight_decay);
                    for (i, param) in group.params.iter().enumerate() {
                        let Some(grad) = param.grad() else { continue };
                        if group.role == GroupRole::LoraFactors
                            && !chosen_layers.contains(&(i / 2))
                        {
                            continue;
                        }

                        let step_next = moment_entry(state, param)?.step + 1;
                        let growth_due = group.role == GroupRole::LoraFactors
                            && step_next % config.fat_step == 0
                            && *fat_budget >= 0;
                        if growth_due {
                            grow_factor(param, config.extension, pending_r, state)?;
                            continue;
                        }

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

/// Double a factor's rank and reset its moment state in the same operation.
fn grow_factor(
    param: &Parameter,
    extension: RankExtension,
    pending_r: &mut Option<Tensor>,
    state: &mut HashMap<ParamId, MomentState>,
) -> Result<()> {
    let value = param.value();
    let dims = value.dims().to_vec();
    let (rows, cols) = match dims[..] {
        [rows, cols] => (rows, cols),
        _ => {
            return Err(OptimError::DimensionMismatch {
                message: format!("rank growth expects 2-D factors, got {dims:?}"),
            })
        }
    };

    let is_a_factor = cols < rows;
    let grown = if is_a_factor {
        match extension {
            RankExtension::Random => {
                let noise = value.rand_like(0.0, 1.0)?;
                Tensor::cat(&[&value, &noise], 1)?
            }
            RankExtension::Orthogonal => {
                let (q, r_block) = qr_reduced(&value)?;
                *pending_r = Some(r_block);
                let noise = value.rand_like(0.0, 1.0)?;
                let eye = Tensor::eye(rows, DType::F32, value.device())?;
                let complement = ((eye - q.matmul(&q.t()?)?)?).matmul(&noise)?;
                Tensor::cat(&[&q, &complement], 1)?
            }
            RankExtension::Restart => {
                let first = value.rand_like(0.0, 1.0)?;
                let second = value.rand_like(0.0, 1.0)?;
                Tensor::cat(&[&first, &second], 1)?
            }
        }
    } else {
        let zeros = value.zeros_like()?;
        match extension {
            RankExtension::Random => Tensor::cat(&[&value, &zeros], 0)?,
            RankExtension::Orthogonal => {
                let r_block = pending_r.as_ref().ok_or_else(|| {
                    OptimError::RankGrowth(
                        "B factor grown before any A factor produced an R block".to_string(),
                    )
                })?;
                let rotated = r_block.matmul(&value)?;
                Tensor::cat(&[&rotated, &zeros], 0)?
            }
            RankExtension::Restart => Tensor::cat(&[&zeros, &zeros], 0)?,
        }
    };

    debug!(param = ?param.id(), from = ?dims, to = ?grown.dims(), "grew adapter factor");
    param.replace_value(grown);
    state.insert(param.id(), MomentState::zeros_like(&param.value())?);
    Ok(())
}

/// Reduced QR factorization via modified Gram-Schmidt.
///
/// Returns `(Q, R)` with `Q` of shape `(m, n)` column-orthonormal and `R`
/// of shape `(n, n)` upper triangular. A numerically zero column yields a
/// zero column in `Q` and a zero diagonal entry in `R`.
fn qr_reduced(a: &Tensor) -> Result<(Tensor, Tensor)> {
    let dims = a.dims().to_vec();
    let (m, n) = match dims[..] {
        [m, n] if m >= n => (m, n),
        _ => {
            return Err(OptimError::DimensionMismatch {
                message: format!(
                    "reduced QR expects a 2-D tensor with rows >= columns, got {dims:?}"
                ),
            })
        }
    };

    let rows = a.to_vec2::<f32>()?;
    let mut q_cols: Vec<Vec<f32>> = Vec::with_capacity(n);
    let mut r = vec![vec![0.0f32; n]; n];

    for j in 0..n {
        let mut v: Vec<f32> = (0..m).map(|i| rows[i][j]).collect();
        for (i2, q_col) in q_cols.iter().enumerate() {
            let dot: f32 = q_col.iter().zip(&v).map(|(q, x)| q * x).sum();
            r[i2][j] = dot;
            for (vt, qt) in v.iter_mut().zip(q_col) {
                *vt -= dot * qt;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        r[j][j] = norm;
        if norm > f32::EPSILON {
            for vt in &mut v {
                *vt /= norm;
            }
        } else {
            for vt in &mut v {
                *vt = 0.0;
            }
        }
        q_cols.push(v);
    }

    let mut q_data = vec![0.0f32; m * n];
    for (j, q_col) in q_cols.iter().enumerate() {
        for (i, &value) in q_col.iter().enumerate() {
            q_data[i * n + j] = value;
        }
    }
    let mut r_data = vec![0.0f32; n * n];
    for (i, row) in r.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            r_data[i * n + j] = value;
        }
    }
    Ok((
        Tensor::from_vec(q_data, (m, n), a.device())?,
        Tensor::from_vec(r_data, (n, n), a.device())?,
    ))
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    fn matrix(values: &[f32], rows: usize, cols: usize, device: &Device) -> Parameter {
        Parameter::new(Tensor::from_vec(values.to_vec(), (rows, cols), device).unwrap())
    }

    fn ones_grad(param: &Parameter, device: &Device) {
        let dims = param.dims();
        param
            .set_grad(Tensor::ones(dims.as_slice(), DType::F32, device).unwrap())
            .unwrap();
    }

    fn gates(values: &[f32], device: &Device) -> Vec<Parameter> {
        values
            .iter()
            .map(|&v| Parameter::scalar(v, device).unwrap())
            .collect()
    }

    fn set_gate_grads(params: &[Parameter], grad: f32, device: &Device) {
        for param in params {
            param
                .set_grad(Tensor::from_vec(vec![grad], (1,), device).unwrap())
                .unwrap();
        }
    }

    fn config(extension: RankExtension, fat_step: usize, max_fat_steps: i64) -> FatAdamWConfig {
        FatAdamWConfig {
            adam: AdamParams::with_lr(0.1),
            num_adapters: 1,
            extension,
            fat_step,
            max_fat_steps,
        }
    }

    #[test]
    fn test_qr_reduced_reconstructs_and_is_orthonormal() {
        let device = Device::Cpu;
        let a = Tensor::from_vec(
            vec![1.0f32, 2.0, 0.5, -1.0, 3.0, 1.5, -2.0, 0.25],
            (4, 2),
            &device,
        )
        .unwrap();
        let (q, r) = qr_reduced(&a).unwrap();
        assert_eq!(q.dims(), &[4, 2]);
        assert_eq!(r.dims(), &[2, 2]);

        // Q^T Q == I
        let qtq = q.t().unwrap().matmul(&q).unwrap().to_vec2::<f32>().unwrap();
        for (i, row) in qtq.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-5, "qtq[{i}][{j}] = {v}");
            }
        }

        // R upper triangular
        let r_rows = r.to_vec2::<f32>().unwrap();
        assert_eq!(r_rows[1][0], 0.0);

        // Q R == A
        let qr = q.matmul(&r).unwrap().to_vec2::<f32>().unwrap();
        let original = a.to_vec2::<f32>().unwrap();
        for (qr_row, a_row) in qr.iter().zip(&original) {
            for (&x, &y) in qr_row.iter().zip(a_row) {
                assert!((x - y).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_random_growth_doubles_rank_and_resets_state() {
        let device = Device::Cpu;
        let a = matrix(&[0.1; 8], 4, 2, &device);
        let b = matrix(&[0.2; 12], 2, 6, &device);
        let groups = vec![ParamGroup::new(
            GroupRole::LoraFactors,
            vec![a.clone(), b.clone()],
        )];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Random, 1, 1)).unwrap();

        ones_grad(&a, &device);
        ones_grad(&b, &device);
        optimizer.step().unwrap();

        assert_eq!(a.dims(), vec![4, 4]);
        assert_eq!(b.dims(), vec![4, 6]);
        assert_eq!(optimizer.state_step(&a), Some(0));
        assert_eq!(optimizer.state_step(&b), Some(0));

        // Moment estimates were reset along with the resize.
        let entry = optimizer.state.get(&a.id()).unwrap();
        let total: f32 = entry
            .exp_avg
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert_eq!(total, 0.0);

        // B keeps its content on top and zero rows below.
        let b_rows = b.value().to_vec2::<f32>().unwrap();
        for &v in &b_rows[0] {
            assert!((v - 0.2).abs() < 1e-6);
        }
        for &v in &b_rows[3] {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_restart_growth_zeroes_b() {
        let device = Device::Cpu;
        let b = matrix(&[0.7; 12], 2, 6, &device);
        let groups = vec![ParamGroup::new(GroupRole::LoraFactors, vec![b.clone()])];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Restart, 1, 1)).unwrap();

        ones_grad(&b, &device);
        optimizer.step().unwrap();

        assert_eq!(b.dims(), vec![4, 6]);
        let total: f32 = b
            .value()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_orthogonal_growth_carries_r_into_b() {
        let device = Device::Cpu;
        let a = matrix(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5, -0.5], 4, 2, &device);
        let b = matrix(&[0.3; 6], 2, 3, &device);
        let groups = vec![ParamGroup::new(
            GroupRole::LoraFactors,
            vec![a.clone(), b.clone()],
        )];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Orthogonal, 1, 1)).unwrap();

        ones_grad(&a, &device);
        ones_grad(&b, &device);
        optimizer.step().unwrap();

        assert_eq!(a.dims(), vec![4, 4]);
        assert_eq!(b.dims(), vec![4, 3]);

        // The bottom half of the grown B is zero padding.
        let b_rows = b.value().to_vec2::<f32>().unwrap();
        for row in &b_rows[2..] {
            for &v in row {
                assert_eq!(v, 0.0);
            }
        }

        // The first half of the grown A is column-orthonormal.
        let a_value = a.value();
        let q = a_value.narrow(1, 0, 2).unwrap();
        let qtq = q.t().unwrap().matmul(&q).unwrap().to_vec2::<f32>().unwrap();
        for (i, row) in qtq.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_orthogonal_b_without_a_is_an_error() {
        let device = Device::Cpu;
        let b = matrix(&[0.3; 6], 2, 3, &device);
        let groups = vec![ParamGroup::new(GroupRole::LoraFactors, vec![b.clone()])];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Orthogonal, 1, 1)).unwrap();

        ones_grad(&b, &device);
        let result = optimizer.step();
        assert!(matches!(result, Err(OptimError::RankGrowth(_))));
    }

    #[test]
    fn test_unchosen_factors_are_skipped() {
        let device = Device::Cpu;
        // Two factor pairs but only one adapter chosen.
        let a0 = matrix(&[0.1; 8], 4, 2, &device);
        let b0 = matrix(&[0.1; 12], 2, 6, &device);
        let a1 = matrix(&[0.1; 8], 4, 2, &device);
        let b1 = matrix(&[0.1; 12], 2, 6, &device);
        let groups = vec![ParamGroup::new(
            GroupRole::LoraFactors,
            vec![a0.clone(), b0.clone(), a1.clone(), b1.clone()],
        )];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Random, 1, 1)).unwrap();

        for p in [&a0, &b0, &a1, &b1] {
            ones_grad(p, &device);
        }
        optimizer.step().unwrap();

        assert_eq!(a0.dims(), vec![4, 4]);
        assert_eq!(a1.dims(), vec![4, 2]);
        assert_eq!(optimizer.state_step(&a1), None);
    }

    #[test]
    fn test_gate_pruning_halves_k_and_tracks_chosen() {
        let device = Device::Cpu;
        let gate_params = gates(&[1.0, 2.0, 3.0, 4.0], &device);
        let groups =
            vec![ParamGroup::new(GroupRole::Gates, gate_params.clone())];
        let config = FatAdamWConfig {
            adam: AdamParams::with_lr(0.1),
            num_adapters: 4,
            extension: RankExtension::Random,
            fat_step: 2,
            max_fat_steps: 2,
        };
        let mut optimizer = FatAdamW::new(groups, config).unwrap();
        assert_eq!(
            optimizer.gate_state(),
            GateSnapshot {
                chosen_layers: vec![0, 1, 2, 3],
                k: 4,
                fat_budget: 2
            }
        );

        // Step 1: descent only.
        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        assert_eq!(optimizer.gate_state().k, 4);

        // Step 2: prune to k=2, keeping the two largest gates.
        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        let snapshot = optimizer.gate_state();
        assert_eq!(snapshot.k, 2);
        assert_eq!(snapshot.fat_budget, 1);
        assert_eq!(snapshot.chosen_layers, vec![2, 3]);
        assert_eq!(gate_params[0].item().unwrap(), 0.0);
        assert_eq!(gate_params[1].item().unwrap(), 0.0);
        assert!((gate_params[3].item().unwrap() - 3.98).abs() < 1e-4);

        // Steps 3-4: only the chosen gates descend; second prune to k=1.
        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        assert_eq!(gate_params[0].item().unwrap(), 0.0);

        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        let snapshot = optimizer.gate_state();
        assert_eq!(snapshot.k, 1);
        assert_eq!(snapshot.fat_budget, 0);
        assert_eq!(snapshot.chosen_layers, vec![3]);
        assert_eq!(gate_params[2].item().unwrap(), 0.0);
        let surviving = gate_params[3].item().unwrap();
        assert!((surviving - 3.96).abs() < 1e-4);

        // Step 5: the exhausted budget flips to the -1 sentinel and gates freeze.
        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        let snapshot = optimizer.gate_state();
        assert_eq!(snapshot.fat_budget, -1);
        assert_eq!(snapshot.k, 1);
        assert!((gate_params[3].item().unwrap() - surviving).abs() < 1e-7);

        // Step 6: still frozen.
        set_gate_grads(&gate_params, 0.1, &device);
        optimizer.step().unwrap();
        assert_eq!(optimizer.gate_state().fat_budget, -1);
        assert!((gate_params[3].item().unwrap() - surviving).abs() < 1e-7);
    }

    #[test]
    fn test_sentinel_disables_growth() {
        let device = Device::Cpu;
        let gate_params = gates(&[1.0], &device);
        let a = matrix(&[0.1; 8], 4, 2, &device);
        // Gate group first: its branch flips the zero budget to -1 before
        // the factor group's growth check runs.
        let groups = vec![
            ParamGroup::new(GroupRole::Gates, gate_params.clone()),
            ParamGroup::new(GroupRole::LoraFactors, vec![a.clone()]),
        ];
        let config = FatAdamWConfig {
            adam: AdamParams::with_lr(0.1),
            num_adapters: 1,
            extension: RankExtension::Random,
            fat_step: 1,
            max_fat_steps: 0,
        };
        let mut optimizer = FatAdamW::new(groups, config).unwrap();

        set_gate_grads(&gate_params, 0.1, &device);
        ones_grad(&a, &device);
        optimizer.step().unwrap();

        // No growth: the factor took a plain Adam step instead.
        assert_eq!(a.dims(), vec![4, 2]);
        assert_eq!(optimizer.state_step(&a), Some(1));
        assert_eq!(optimizer.gate_state().fat_budget, -1);
    }

    #[test]
    fn test_growth_waits_for_fat_step() {
        let device = Device::Cpu;
        let a = matrix(&[0.1; 8], 4, 2, &device);
        let groups = vec![ParamGroup::new(GroupRole::LoraFactors, vec![a.clone()])];
        let mut optimizer =
            FatAdamW::new(groups, config(RankExtension::Random, 2, 1)).unwrap();

        ones_grad(&a, &device);
        optimizer.step().unwrap();
        // First step is a plain Adam step.
        assert_eq!(a.dims(), vec![4, 2]);
        assert_eq!(optimizer.state_step(&a), Some(1));

        ones_grad(&a, &device);
        optimizer.step().unwrap();
        // Second step hits the growth period.
        assert_eq!(a.dims(), vec![4, 4]);
        assert_eq!(optimizer.state_step(&a), Some(0));
    }
}
