// ========================================================================================
//
//                 DEMODECOMP NUMERICAL INTEGRATION BENCHMARK
//
// ========================================================================================
//
// Measures the cost of Horiuchi decomposition of life expectancy as the integration
// resolution grows, over a 100-age Gompertz schedule. The cost should scale linearly
// in N; the stepwise decomposer is measured alongside as the O(n) reference point.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use demodecomp::horiuchi::{HoriuchiConfig, horiuchi};
use demodecomp::lifetable::rates_to_life_expectancy_at_birth;
use demodecomp::stepwise::{StepwiseConfig, stepwise_replacement};
use ndarray::Array1;

const NUM_AGES: usize = 100;
const RESOLUTIONS: [usize; 4] = [1, 5, 20, 100];

fn gompertz(scale: f64) -> Array1<f64> {
    Array1::from_shape_fn(NUM_AGES, |x| scale * 5e-4 * (0.085 * x as f64).exp())
}

fn bench_horiuchi(c: &mut Criterion) {
    let mx1 = gompertz(1.0);
    let mx2 = gompertz(0.8);

    let mut group = c.benchmark_group("horiuchi_e0");
    for steps in RESOLUTIONS {
        let config = HoriuchiConfig::with_resolution(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &config, |b, config| {
            b.iter(|| {
                horiuchi(
                    &rates_to_life_expectancy_at_birth,
                    black_box(mx1.view()),
                    black_box(mx2.view()),
                    config,
                    None,
                )
            })
        });
    }
    group.finish();

    c.bench_function("stepwise_e0_both", |b| {
        let config = StepwiseConfig::default();
        b.iter(|| {
            stepwise_replacement(
                &rates_to_life_expectancy_at_birth,
                black_box(mx1.view()),
                black_box(mx2.view()),
                &config,
                None,
            )
        })
    });
}

criterion_group!(benches, bench_horiuchi);
criterion_main!(benches);
