//! Criterion benchmarks for paramsweep_core combination building and sweeps
//!
//! Run with: cargo bench -p paramsweep_core

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use paramsweep_core::combination::build_combinations;
use paramsweep_core::{
    Component, ComponentKind, ModelError, OptimizeFn, ParameterSweep, SampleSpec, SamplingType,
    SingleWorker, SolverOptions, SweepDefinition, SweepModel, SweepOptions, SweepParams,
    TerminationCondition, run_workers,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Two parameters and one expression `p * q`
#[derive(Debug, Clone, Default)]
struct PointModel {
    p: f64,
    q: f64,
}

impl SweepModel for PointModel {
    fn find_component(&self, name: &str) -> Option<Component> {
        match name {
            "m.p" | "m.q" => Some(Component::new(name, ComponentKind::Parameter)),
            "m.f" => Some(Component::new(name, ComponentKind::Expression)),
            _ => None,
        }
    }

    fn value(&self, name: &str) -> Result<f64, ModelError> {
        match name {
            "m.p" => Ok(self.p),
            "m.q" => Ok(self.q),
            "m.f" => Ok(self.p * self.q),
            _ => Err(ModelError::ComponentNotFound(name.to_string())),
        }
    }

    fn set_value(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        match name {
            "m.p" => self.p = value,
            "m.q" => self.q = value,
            _ => return Err(ModelError::ComponentNotFound(name.to_string())),
        }
        Ok(())
    }

    fn fix(&mut self, name: &str, _value: Option<f64>) -> Result<(), ModelError> {
        Err(ModelError::ComponentNotFound(name.to_string()))
    }

    fn unfix(&mut self, name: &str) -> Result<(), ModelError> {
        Err(ModelError::ComponentNotFound(name.to_string()))
    }

    fn set_lower_bound(&mut self, name: &str, _value: f64) -> Result<(), ModelError> {
        Err(ModelError::ComponentNotFound(name.to_string()))
    }

    fn set_upper_bound(&mut self, name: &str, _value: f64) -> Result<(), ModelError> {
        Err(ModelError::ComponentNotFound(name.to_string()))
    }

    fn active_components(&self) -> Vec<Component> {
        ["m.p", "m.q", "m.f"]
            .into_iter()
            .filter_map(|name| self.find_component(name))
            .collect()
    }
}

fn always_optimal() -> OptimizeFn<PointModel> {
    Arc::new(
        |_: &mut PointModel, _: &SolverOptions, _: bool| -> Result<TerminationCondition, ModelError> {
            Ok(TerminationCondition::Optimal)
        },
    )
}

fn mesh_params(per_axis: usize) -> SweepParams {
    SweepParams::new()
        .with("p", SampleSpec::linear("m.p", 0.0, 1.0, per_axis))
        .with("q", SampleSpec::geometric("m.q", 1.0, 100.0, per_axis))
}

fn bench_fixed_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_mesh");

    for per_axis in [10, 50, 200].iter() {
        let params = mesh_params(*per_axis);
        group.bench_with_input(BenchmarkId::new("per_axis", per_axis), per_axis, |b, _| {
            let mut rng = StdRng::seed_from_u64(42);
            b.iter(|| build_combinations(black_box(&params), SamplingType::Fixed, &mut rng, false))
        });
    }

    group.finish();
}

fn bench_random_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_sampling");
    let samples = 10_000;

    let uniform = SweepParams::new()
        .with("p", SampleSpec::uniform("m.p", 0.0, 1.0, samples))
        .with("q", SampleSpec::normal("m.q", 5.0, 1.0, samples));
    group.bench_function("uniform_normal", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        b.iter(|| build_combinations(black_box(&uniform), SamplingType::Random, &mut rng, false))
    });

    let lhs = SweepParams::new()
        .with("p", SampleSpec::latin_hypercube("m.p", 0.0, 1.0, samples))
        .with("q", SampleSpec::latin_hypercube("m.q", 1.0, 2.0, samples));
    group.bench_function("latin_hypercube", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        b.iter(|| build_combinations(black_box(&lhs), SamplingType::RandomLhs, &mut rng, false))
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    let definition = SweepDefinition::new(
        PointModel::default,
        |_: &PointModel| mesh_params(40),
        always_optimal(),
    )
    .options(SweepOptions {
        seed: Some(42),
        ..Default::default()
    });

    group.bench_function("single_worker", |b| {
        b.iter(|| {
            ParameterSweep::new(black_box(&definition), &SingleWorker)
                .and_then(|mut sweep| sweep.run(None))
        })
    });

    for workers in [2, 4].iter() {
        group.bench_with_input(BenchmarkId::new("workers", workers), workers, |b, &n| {
            b.iter(|| {
                run_workers(n, |worker| {
                    ParameterSweep::new(&definition, &worker)
                        .and_then(|mut sweep| sweep.run(None))
                        .map(|result| result.global.nrows())
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fixed_mesh, bench_random_sampling, bench_sweep);
criterion_main!(benches);
