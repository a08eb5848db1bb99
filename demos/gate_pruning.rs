//! Gate pruning and rank growth walkthrough.
//!
//! This demo demonstrates:
//! - Building gate, factor, and dense parameter groups
//! - Stepping `FatAdamW` with synthetic gradients
//! - Watching the pruning state machine shrink the active adapter set
//! - Observing factor shapes double at growth events

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use lora_optim_rs::{
    AdamParams, FatAdamW, FatAdamWConfig, GroupRole, Optimizer, ParamGroup, Parameter,
    RankExtension,
};

fn main() -> Result<()> {
    println!("=== Gate Pruning Demo ===\n");

    let device = Device::Cpu;
    let num_adapters = 4;
    let rank = 2;
    let features = 8;

    // One scalar gate per adapter; later gates start stronger so the
    // pruning order is easy to follow.
    let gates: Vec<Parameter> = (0..num_adapters)
        .map(|i| Parameter::scalar(1.0 + i as f32, &device))
        .collect::<Result<_, _>>()?;

    // One (A, B) low-rank factor pair per adapter, interleaved.
    let mut factors = Vec::new();
    for _ in 0..num_adapters {
        factors.push(Parameter::new(Tensor::rand(
            0.0f32,
            1.0,
            (features, rank),
            &device,
        )?));
        factors.push(Parameter::new(Tensor::zeros(
            (rank, features),
            DType::F32,
            &device,
        )?));
    }

    let groups = vec![
        ParamGroup::new(GroupRole::Gates, gates.clone()),
        ParamGroup::new(GroupRole::LoraFactors, factors.clone()),
    ];
    let config = FatAdamWConfig {
        adam: AdamParams::with_lr(0.05),
        num_adapters,
        extension: RankExtension::Random,
        fat_step: 3,
        max_fat_steps: 2,
    };
    let mut optimizer = FatAdamW::new(groups, config)?;

    for step in 1..=10 {
        // Synthetic gradients standing in for a backward pass.
        for gate in &gates {
            gate.set_grad(Tensor::from_vec(vec![0.1f32], (1,), &device)?)?;
        }
        for factor in &factors {
            let dims = factor.dims();
            factor.set_grad(Tensor::rand(0.0f32, 0.01, dims.as_slice(), &device)?)?;
        }

        optimizer.step()?;
        optimizer.zero_grad();

        let snapshot = optimizer.gate_state();
        // Adapter 3 starts with the strongest gate and survives pruning
        // the longest; watch its A factor fatten.
        println!(
            "step {step:2}: k={} budget={} chosen={:?} adapter-3 A factor {:?}",
            snapshot.k,
            snapshot.fat_budget,
            snapshot.chosen_layers,
            factors[2 * (num_adapters - 1)].dims(),
        );
    }

    println!("\nGate values after training:");
    for (i, gate) in gates.iter().enumerate() {
        println!("  adapter {i}: {:.4}", gate.item()?);
    }

    Ok(())
}
