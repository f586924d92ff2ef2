use distmm::{
    multiply, naive_multiply, Dims, KernelPreference, Matrix, MultiplyConfig, TiledMultiplier,
};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};

const REL_TOL: f64 = 1e-9;

fn random_operands(m: usize, k: usize, n: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    (
        Matrix::random(m, k, &mut rng).unwrap(),
        Matrix::random(k, n, &mut rng).unwrap(),
    )
}

fn assert_close(expected: &Matrix, actual: &Matrix, name: &str) {
    assert_eq!(expected.shape(), actual.shape(), "{}: shape mismatch", name);
    for i in 0..expected.rows() {
        for j in 0..expected.cols() {
            let (e, a) = (expected.get(i, j), actual.get(i, j));
            assert!(
                (e - a).abs() <= REL_TOL * 1.0f64.max(e.abs()).max(a.abs()),
                "{}: mismatch at ({}, {}): expected {}, got {}",
                name,
                i,
                j,
                e,
                a
            );
        }
    }
}

// ============================================================
// Concrete scenarios
// ============================================================

#[test]
fn test_2x2_multiply() {
    let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
    let c = multiply(&a, &b, Dims::new(2, 2, 2), &MultiplyConfig::default()).unwrap();
    assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn test_2x3_times_3x2() {
    let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let b = Matrix::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
    let c = multiply(&a, &b, Dims::new(2, 3, 2), &MultiplyConfig::default()).unwrap();
    assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);
}

// ============================================================
// Agreement with independent references
// ============================================================

#[test]
fn test_matches_naive_reference() {
    let shapes = [
        (1, 1, 1),
        (3, 5, 7),
        (16, 16, 16),
        (33, 65, 17),
        (64, 64, 64),
        (100, 37, 81),
    ];
    for (seed, &(m, k, n)) in shapes.iter().enumerate() {
        let (a, b) = random_operands(m, k, n, seed as u64);
        let expected = naive_multiply(&a, &b).unwrap();
        let c = multiply(&a, &b, Dims::new(m, k, n), &MultiplyConfig::default()).unwrap();
        assert_close(&expected, &c, &format!("{m}x{k}x{n}"));
    }
}

#[test]
fn test_matches_ndarray_dot() {
    let (a, b) = random_operands(45, 70, 38, 99);
    let expected: Array2<f64> = a.to_array2().dot(&b.to_array2());
    let c = multiply(&a, &b, Dims::new(45, 70, 38), &MultiplyConfig::default()).unwrap();
    assert_close(&Matrix::try_from(&expected).unwrap(), &c, "ndarray");
}

// ============================================================
// Independence from tiling, threading and backend
// ============================================================

#[test]
fn test_result_independent_of_tile_size_and_threads() {
    let (a, b) = random_operands(50, 83, 29, 1234);
    let expected = naive_multiply(&a, &b).unwrap();

    for tile in [1, 8, 16, 64] {
        for threads in [1, 2, 8] {
            let config = MultiplyConfig::default()
                .with_tile_size(tile)
                .with_threads(threads);
            let c = multiply(&a, &b, Dims::new(50, 83, 29), &config).unwrap();
            assert_close(&expected, &c, &format!("tile {tile}, threads {threads}"));
        }
    }
}

#[test]
fn test_scalar_backend_agrees_with_detected_backend() {
    let (a, b) = random_operands(31, 97, 23, 8);
    let dims = Dims::new(31, 97, 23);
    let fast = multiply(&a, &b, dims, &MultiplyConfig::default()).unwrap();
    let slow = multiply(
        &a,
        &b,
        dims,
        &MultiplyConfig::default().with_kernel(KernelPreference::Scalar),
    )
    .unwrap();
    assert_close(&slow, &fast, "scalar vs vector");
}

#[test]
fn test_idempotent_on_fresh_buffers() {
    let (a, b) = random_operands(20, 40, 12, 77);
    let multiplier = TiledMultiplier::new(&MultiplyConfig::default().with_threads(4)).unwrap();

    let mut first = Matrix::padded(20, 12).unwrap();
    let mut second = Matrix::padded(20, 12).unwrap();
    multiplier.multiply_into(&a, &b, &mut first).unwrap();
    multiplier.multiply_into(&a, &b, &mut second).unwrap();
    assert_eq!(first, second);
}

// ============================================================
// Edge shapes
// ============================================================

#[test]
fn test_row_vector_times_matrix() {
    let (a, b) = random_operands(1, 19, 13, 5);
    let expected = naive_multiply(&a, &b).unwrap();
    for tile in [1, 8, 64] {
        let config = MultiplyConfig::default().with_tile_size(tile);
        let c = multiply(&a, &b, Dims::new(1, 19, 13), &config).unwrap();
        assert_close(&expected, &c, &format!("1x19x13 tile {tile}"));
    }
}

#[test]
fn test_matrix_times_column_vector() {
    let (a, b) = random_operands(21, 11, 1, 6);
    let expected = naive_multiply(&a, &b).unwrap();
    for tile in [1, 8, 64] {
        let config = MultiplyConfig::default().with_tile_size(tile);
        let c = multiply(&a, &b, Dims::new(21, 11, 1), &config).unwrap();
        assert_close(&expected, &c, &format!("21x11x1 tile {tile}"));
    }
}

#[test]
fn test_inner_dimension_not_multiple_of_vector_width() {
    // a_cols = 10 with 8-wide vectors leaves a 2-element tail.
    let a = Matrix::from_fn(3, 10, |i, k| (i + 1) as f64 * (k + 1) as f64).unwrap();
    let b = Matrix::from_fn(10, 2, |k, j| if j == 0 { 1.0 } else { k as f64 }).unwrap();
    let expected = naive_multiply(&a, &b).unwrap();

    for tile in [1, 3, 8, 16] {
        let config = MultiplyConfig::default().with_tile_size(tile);
        let c = multiply(&a, &b, Dims::new(3, 10, 2), &config).unwrap();
        assert_close(&expected, &c, &format!("k=10 tile {tile}"));
    }
    // sum_{k=1..10} k = 55 for the first column of row 0.
    assert_eq!(expected.get(0, 0), 55.0);
}

#[test]
fn test_huge_tile_size_is_accepted() {
    let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
    let config = MultiplyConfig::default().with_tile_size(usize::MAX / 2);
    assert!(config.validate().is_ok());

    let c = multiply(&a, &b, Dims::new(2, 2, 2), &config).unwrap();
    assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);

    let c = distmm::multiply_distributed(&a, &b, Dims::new(2, 2, 2), 2, &config).unwrap();
    assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn test_strided_operands() {
    let (dense_a, b) = random_operands(6, 9, 4, 42);
    let mut strided_a = Matrix::with_stride(6, 9, 13).unwrap();
    for i in 0..6 {
        strided_a.row_mut(i).copy_from_slice(dense_a.row(i));
    }
    let expected = naive_multiply(&dense_a, &b).unwrap();
    let c = multiply(&strided_a, &b, Dims::new(6, 9, 4), &MultiplyConfig::default()).unwrap();
    assert_close(&expected, &c, "strided A");
}
