//! Distributed dense matrix multiplication.
//!
//! `C = A * B` is computed in three layers:
//!
//! - [`dist::Coordinator`] splits `A` into row blocks, one per process,
//!   replicates `B` everywhere and reassembles `C` on the root.
//! - [`matmul::TiledMultiplier`] multiplies one process's row block with
//!   cache-sized tiles spread over a Rayon thread pool.
//! - [`simd::VectorKernel`] computes the dot-product runs inside a tile with
//!   the widest vector unit the CPU offers, falling back to scalar code.
//!
//! # Usage
//!
//! ```
//! use distmm::{multiply, multiply_distributed, Dims, Matrix, MultiplyConfig};
//!
//! let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
//! let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
//! let dims = Dims::new(2, 2, 2);
//!
//! let c = multiply(&a, &b, dims, &MultiplyConfig::default()).unwrap();
//! assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
//!
//! // Same product over two in-process ranks.
//! let c = multiply_distributed(&a, &b, dims, 2, &MultiplyConfig::default()).unwrap();
//! assert_eq!(c.to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
//! ```
//!
//! Real clusters plug their transport in by implementing
//! [`dist::comm::Communicator`] and driving a [`dist::Coordinator`] on every
//! process.

pub mod config;
pub mod dist;
pub mod error;
pub mod matmul;
pub mod matrix;
pub mod simd;
pub mod utils;

pub use config::{AlignmentPolicy, KernelPreference, MultiplyConfig};
pub use dist::{
    comm::{Communicator, SingleProcess},
    local::{run_local, LocalEndpoint, LocalGroup},
    partition::{partition, RowPartition},
    Coordinator, ROOT,
};
pub use error::{DistmmError, Result};
pub use matmul::TiledMultiplier;
pub use matrix::{naive_multiply, Dims, Matrix};
pub use simd::{DotKernel, VectorKernel};

/// Default edge length of the square cache tiles.
pub const DEFAULT_TILE_SIZE: usize = 64;

/// Widest vector the kernels use, in `f64` lanes (512 bits).
pub const MAX_LANES: usize = 8;

/// Byte alignment of every matrix buffer; enough for 512-bit aligned loads.
pub const VECTOR_ALIGNMENT: usize = 64;

/// Multiplies `a * b` in the calling process.
pub fn multiply(a: &Matrix, b: &Matrix, dims: Dims, config: &MultiplyConfig) -> Result<Matrix> {
    let coordinator = Coordinator::new(SingleProcess, config)?;
    coordinator
        .multiply(Some(a), Some(b), dims)?
        .ok_or_else(|| error::distribution_failure(ROOT, "root produced no result"))
}

/// Multiplies `a * b` over a [`LocalGroup`] of `processes` ranks and returns
/// the root's result.
///
/// Operands and the process count are validated before any rank starts.
pub fn multiply_distributed(
    a: &Matrix,
    b: &Matrix,
    dims: Dims,
    processes: usize,
    config: &MultiplyConfig,
) -> Result<Matrix> {
    dims.check_operands(a, b)?;
    config.validate()?;
    partition(dims.a_rows, processes)?;

    let results = run_local(processes, |comm| {
        let coordinator = Coordinator::new(comm, config)?;
        if coordinator.is_root() {
            coordinator.multiply(Some(a), Some(b), dims)
        } else {
            coordinator.multiply(None, None, dims)
        }
    })?;

    results
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| error::distribution_failure(ROOT, "root produced no result"))
}
