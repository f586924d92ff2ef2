use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use distmm::{
    multiply, multiply_distributed, Dims, KernelPreference, Matrix, MultiplyConfig,
};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};

const SIZES: [usize; 4] = [64, 128, 256, 512];

fn square_operands(n: usize) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(n as u64);
    (
        Matrix::random(n, n, &mut rng).unwrap(),
        Matrix::random(n, n, &mut rng).unwrap(),
    )
}

fn bench_local(c: &mut Criterion) {
    let mut group = c.benchmark_group("Local Multiply");

    for &n in &SIZES {
        let (a, b) = square_operands(n);
        let dims = Dims::new(n, n, n);
        group.throughput(Throughput::Elements((2 * n * n * n) as u64));

        let vector = MultiplyConfig::default();
        group.bench_with_input(BenchmarkId::new("distmm (vector)", n), &n, |bench, _| {
            bench.iter(|| multiply(black_box(&a), black_box(&b), dims, &vector).unwrap())
        });

        let scalar = MultiplyConfig::default().with_kernel(KernelPreference::Scalar);
        group.bench_with_input(BenchmarkId::new("distmm (scalar)", n), &n, |bench, _| {
            bench.iter(|| multiply(black_box(&a), black_box(&b), dims, &scalar).unwrap())
        });

        let (a_nd, b_nd): (Array2<f64>, Array2<f64>) = (a.to_array2(), b.to_array2());
        group.bench_with_input(BenchmarkId::new("ndarray", n), &n, |bench, _| {
            bench.iter(|| black_box(&a_nd).dot(black_box(&b_nd)))
        });
    }
    group.finish();
}

fn bench_tile_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tile Size");
    let n = 256;
    let (a, b) = square_operands(n);
    let dims = Dims::new(n, n, n);

    for tile in [16, 32, 64, 128] {
        let config = MultiplyConfig::default().with_tile_size(tile);
        group.bench_with_input(BenchmarkId::from_parameter(tile), &tile, |bench, _| {
            bench.iter(|| multiply(black_box(&a), black_box(&b), dims, &config).unwrap())
        });
    }
    group.finish();
}

fn bench_distributed(c: &mut Criterion) {
    let mut group = c.benchmark_group("Distributed Multiply");
    group.sample_size(20);
    let n = 256;
    let (a, b) = square_operands(n);
    let dims = Dims::new(n, n, n);

    for processes in [1, 2, 4] {
        // Split the machine's cores between ranks.
        let threads = (rayon::current_num_threads() / processes).max(1);
        let config = MultiplyConfig::default().with_threads(threads);
        group.bench_with_input(
            BenchmarkId::from_parameter(processes),
            &processes,
            |bench, &processes| {
                bench.iter(|| {
                    multiply_distributed(black_box(&a), black_box(&b), dims, processes, &config)
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_local, bench_tile_size, bench_distributed);
criterion_main!(benches);
