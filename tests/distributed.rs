use distmm::{
    multiply, multiply_distributed, naive_multiply, partition, run_local, AlignmentPolicy,
    Coordinator, Dims, DistmmError, Matrix, MultiplyConfig,
};
use rand::{rngs::StdRng, SeedableRng};

fn random_operands(m: usize, k: usize, n: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    (
        Matrix::random(m, k, &mut rng).unwrap(),
        Matrix::random(k, n, &mut rng).unwrap(),
    )
}

#[test]
fn test_2x2_with_one_and_two_processes() {
    let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
    for processes in [1, 2] {
        let c = multiply_distributed(&a, &b, Dims::new(2, 2, 2), processes, &MultiplyConfig::default())
            .unwrap();
        assert_eq!(
            c.to_vec(),
            vec![19.0, 22.0, 43.0, 50.0],
            "{processes} processes"
        );
    }
}

#[test]
fn test_uneven_row_split_covers_every_row() {
    // 23 rows over 4 processes: 5, 5, 5 and 8 rows.
    let (a, b) = random_operands(23, 17, 9, 3);
    let expected = naive_multiply(&a, &b).unwrap();
    for processes in 1..=6 {
        let config = MultiplyConfig::default().with_tile_size(4).with_threads(2);
        let c = multiply_distributed(&a, &b, Dims::new(23, 17, 9), processes, &config).unwrap();
        assert!(
            c.approx_eq(&expected, 1e-9),
            "{processes} processes disagree with the reference"
        );
    }
}

#[test]
fn test_distributed_matches_single_process() {
    let (a, b) = random_operands(40, 66, 35, 21);
    let dims = Dims::new(40, 66, 35);
    let config = MultiplyConfig::default().with_tile_size(16);
    let single = multiply(&a, &b, dims, &config).unwrap();
    let distributed = multiply_distributed(&a, &b, dims, 5, &config).unwrap();
    assert!(single.approx_eq(&distributed, 1e-9));
}

#[test]
fn test_one_row_per_process() {
    let (a, b) = random_operands(4, 10, 3, 8);
    let expected = naive_multiply(&a, &b).unwrap();
    let c = multiply_distributed(&a, &b, Dims::new(4, 10, 3), 4, &MultiplyConfig::default()).unwrap();
    assert!(c.approx_eq(&expected, 1e-9));
}

#[test]
fn test_more_processes_than_rows_is_rejected() {
    let (a, b) = random_operands(3, 4, 4, 1);
    let result = multiply_distributed(&a, &b, Dims::new(3, 4, 4), 4, &MultiplyConfig::default());
    assert!(matches!(result, Err(DistmmError::ConfigurationError { .. })));

    let result = multiply_distributed(&a, &b, Dims::new(3, 4, 4), 0, &MultiplyConfig::default());
    assert!(matches!(result, Err(DistmmError::ConfigurationError { .. })));
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let (a, b) = random_operands(3, 4, 5, 1);
    let result = multiply_distributed(&a, &b, Dims::new(3, 5, 5), 2, &MultiplyConfig::default());
    assert!(matches!(result, Err(DistmmError::ConfigurationError { .. })));
}

#[test]
fn test_enforced_alignment_holds_across_ranks() {
    // Scattered slices and the broadcast B land in padded storage, so the
    // enforcing policy never trips inside the group.
    let (a, b) = random_operands(11, 13, 7, 2);
    let config = MultiplyConfig::default().with_alignment(AlignmentPolicy::Enforce);
    let c = multiply_distributed(&a, &b, Dims::new(11, 13, 7), 3, &config).unwrap();
    assert!(c.approx_eq(&naive_multiply(&a, &b).unwrap(), 1e-9));
}

#[test]
fn test_rank_failure_returns_no_partial_result() {
    let (a, b) = random_operands(6, 5, 4, 9);
    let dims = Dims::new(6, 5, 4);
    let result = run_local(3, |comm| {
        let coordinator = Coordinator::new(comm, &MultiplyConfig::default())?;
        match coordinator.rank() {
            0 => coordinator.multiply(Some(&a), Some(&b), dims),
            // Rank 2 crashes after receiving its slice of A.
            2 => {
                let partitions = coordinator.partitions(dims.a_rows)?;
                coordinator.broadcast_b(None, dims)?;
                coordinator.scatter(None, &partitions, dims.a_cols)?;
                Err(distmm::error::distribution_failure(2, "simulated crash"))
            }
            _ => coordinator.multiply(None, None, dims),
        }
    });

    match result {
        Err(DistmmError::DistributionFailure { .. }) => {}
        other => panic!("expected a distribution failure, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_partition_matches_coordinator_plan() {
    let plans = run_local(3, |comm| {
        let coordinator = Coordinator::new(comm, &MultiplyConfig::default())?;
        coordinator.partitions(10)
    })
    .unwrap();
    let expected = partition(10, 3).unwrap();
    assert!(plans.iter().all(|plan| plan == &expected));
    assert_eq!(expected.last().unwrap().len(), 4);
}
