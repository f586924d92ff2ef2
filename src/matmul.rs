//! Tiled local multiplier: `C_local = A_local * B` on one process.
//!
//! The output is cut into `T x T` tiles. Row tiles are handed out with
//! `par_chunks_mut`, so every worker owns a disjoint band of `C`; within a
//! band the column tiles are computed in parallel into disjoint blocks of a
//! per-worker scratch buffer and committed by the band owner. The reduction
//! dimension is walked in steps of `T` rounded up to the kernel's lane count,
//! inside a single task, and is never split across threads.
//!
//! ```text
//! par for row_tile in 0..m step T:           // disjoint output rows
//!     par for col_tile in 0..n step T:       // tile computed into scratch
//!         for k_tile in 0..k step K:         // K = T rounded up to lanes
//!             for i in row_tile, j in col_tile:
//!                 acc[i][j] = kernel.dot(A[i][k_tile], Bt[j][k_tile], acc[i][j])
//!     commit tiles into C band
//! ```
//!
//! `B` is transposed once into padded scratch so that each of its columns is
//! a contiguous, vector-aligned run for the kernel. `T` itself is capped at
//! the largest matrix extent, and every tile bound is clamped to the true
//! extent of the matrices.

use std::borrow::Cow;
use std::cmp::min;
use std::ops::Range;

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
    ThreadPool, ThreadPoolBuilder,
};

use crate::{
    config::{AlignmentPolicy, MultiplyConfig},
    error::{alignment_error, configuration_error, Result},
    matrix::Matrix,
    simd::VectorKernel,
    utils::round_up,
};

/// Cache-blocked, multi-threaded `A * B` for one process's row slice.
pub struct TiledMultiplier {
    tile_size: usize,
    alignment: AlignmentPolicy,
    kernel: VectorKernel,
    pool: Option<ThreadPool>,
}

impl TiledMultiplier {
    /// Validates `config`, selects the vector kernel and, when a thread count
    /// is given, builds a dedicated worker pool.
    pub fn new(config: &MultiplyConfig) -> Result<Self> {
        config.validate()?;

        let pool = match config.threads {
            Some(threads) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("distmm-worker-{i}"))
                    .build()
                    .map_err(|e| {
                        configuration_error(format!("cannot build a {threads}-thread pool: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(TiledMultiplier {
            tile_size: config.tile_size,
            alignment: config.alignment,
            kernel: VectorKernel::from_preference(config.kernel),
            pool,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn kernel(&self) -> VectorKernel {
        self.kernel
    }

    /// Number of workers the product runs on.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Returns `a * b` in a freshly allocated, zero-initialised matrix.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let mut c = Matrix::padded(a.rows(), b.cols())?;
        self.multiply_into(a, b, &mut c)?;
        Ok(c)
    }

    /// Overwrites `c` with `a * b`.
    ///
    /// `c` is zeroed first, so stale contents of a reused buffer never leak
    /// into the result.
    pub fn multiply_into(&self, a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<()> {
        if a.cols() != b.rows() {
            return Err(configuration_error(format!(
                "cannot multiply {}x{} by {}x{}",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            )));
        }
        if c.shape() != (a.rows(), b.cols()) {
            return Err(configuration_error(format!(
                "result is {}x{}, expected {}x{}",
                c.rows(),
                c.cols(),
                a.rows(),
                b.cols()
            )));
        }

        c.fill(0.0);
        if a.rows() == 0 || b.cols() == 0 {
            return Ok(());
        }

        let a = self.aligned_rows(a)?;
        let bt = b.transpose_padded()?;

        log::debug!(
            "tiled multiply {}x{}x{} (tile: {}, kernel: {}, threads: {})",
            a.rows(),
            a.cols(),
            bt.rows(),
            self.tile_size,
            self.kernel.name(),
            self.threads()
        );

        match &self.pool {
            Some(pool) => pool.install(|| self.compute(&a, &bt, c)),
            None => self.compute(&a, &bt, c),
        }
        Ok(())
    }

    /// Makes sure every row of `a` starts where the kernel's aligned loads
    /// can reach it.
    fn aligned_rows<'a>(&self, a: &'a Matrix) -> Result<Cow<'a, Matrix>> {
        let required = self.kernel.alignment();
        if a.is_row_aligned(required) {
            return Ok(Cow::Borrowed(a));
        }

        match self.alignment {
            AlignmentPolicy::Enforce => {
                let base = a.as_ptr() as usize;
                let address = if base % required != 0 {
                    base
                } else {
                    base + a.stride() * std::mem::size_of::<f64>()
                };
                Err(alignment_error(
                    address,
                    required,
                    format!(
                        "rows of a {}x{} operand with stride {} are not {}-byte aligned",
                        a.rows(),
                        a.cols(),
                        a.stride(),
                        required
                    ),
                ))
            }
            AlignmentPolicy::Fallback => {
                log::debug!(
                    "copying {}x{} operand (stride {}) into aligned scratch",
                    a.rows(),
                    a.cols(),
                    a.stride()
                );
                let mut scratch = Matrix::padded(a.rows(), a.cols())?;
                for i in 0..a.rows() {
                    scratch.row_mut(i).copy_from_slice(a.row(i));
                }
                Ok(Cow::Owned(scratch))
            }
        }
    }

    fn compute(&self, a: &Matrix, bt: &Matrix, c: &mut Matrix) {
        let kernel = self.kernel;
        let (m, n, k) = (a.rows(), bt.rows(), a.cols());
        // Tiles never need to exceed the largest extent.
        let tile = self.tile_size.min(m.max(n).max(k)).max(1);
        let k_step = reduction_step(tile, kernel.lanes());
        let stride = c.stride();

        c.as_mut_slice()
            .par_chunks_mut(tile.saturating_mul(stride))
            .enumerate()
            .for_each_init(Vec::new, |scratch: &mut Vec<f64>, (row_tile, band)| {
                let row_start = row_tile * tile;
                let rows = row_start..min(row_start.saturating_add(tile), m);
                let height = rows.len();

                // Tile-major scratch: column tile `t` owns one contiguous block.
                let block_len = height.saturating_mul(tile);
                scratch.resize(height * n, 0.0);
                scratch
                    .par_chunks_mut(block_len)
                    .enumerate()
                    .for_each(|(col_tile, block)| {
                        let col_start = col_tile * tile;
                        let cols = col_start..min(col_start.saturating_add(tile), n);
                        compute_tile(a, bt, kernel, rows.clone(), cols, k_step, block);
                    });

                for (col_tile, block) in scratch.chunks(block_len).enumerate() {
                    let col_start = col_tile * tile;
                    let width = block.len() / height;
                    for (local_row, src) in block.chunks_exact(width).enumerate() {
                        let offset = local_row * stride + col_start;
                        band[offset..offset + width].copy_from_slice(src);
                    }
                }
            });
    }
}

/// Reduction step: `tile` rounded up to a whole number of vectors, so every
/// k-segment of an aligned row starts on the kernel's alignment.
pub(crate) fn reduction_step(tile: usize, lanes: usize) -> usize {
    round_up(tile, lanes.max(1))
}

/// Accumulates one output tile over the whole reduction dimension into
/// `block` (`rows.len() x cols.len()`, row-major).
fn compute_tile(
    a: &Matrix,
    bt: &Matrix,
    kernel: VectorKernel,
    rows: Range<usize>,
    cols: Range<usize>,
    k_step: usize,
    block: &mut [f64],
) {
    let k = a.cols();
    let width = cols.len();
    debug_assert_eq!(block.len(), rows.len() * width);
    block.fill(0.0);

    for k_start in (0..k).step_by(k_step) {
        let k_end = min(k_start + k_step, k);
        for (local_row, i) in rows.clone().enumerate() {
            let a_seg = &a.row(i)[k_start..k_end];
            let acc_row = &mut block[local_row * width..(local_row + 1) * width];
            for (acc, j) in acc_row.iter_mut().zip(cols.clone()) {
                *acc = kernel.dot(a_seg, &bt.row(j)[k_start..k_end], *acc);
            }
        }
    }
}
