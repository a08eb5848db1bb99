//! Benchmarks for the optimizer update rules.

#![allow(missing_docs)]

use candle_core::{DType, Device, Tensor};
use criterion::{criterion_group, criterion_main, Criterion};
use lora_optim_rs::{AdamParams, AdamW, Optimizer, Parameter};

fn benchmark_adamw_step(c: &mut Criterion) {
    let device = Device::Cpu;
    let param = Parameter::new(Tensor::zeros((256, 256), DType::F32, &device).unwrap());
    let grad = Tensor::ones((256, 256), DType::F32, &device).unwrap();
    let mut optimizer =
        AdamW::from_parameters(vec![param.clone()], AdamParams::default()).unwrap();

    let mut group = c.benchmark_group("optim");
    group.bench_function("adamw_step_256x256", |b| {
        b.iter(|| {
            param.set_grad(grad.clone()).unwrap();
            optimizer.step().unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_adamw_step);
criterion_main!(benches);
