//! Distribution coordinator: row-block data parallelism across processes.
//!
//! ```text
//! root                                  every rank
//! ----                                  ----------
//! partition(a_rows, size)               partition(a_rows, size)
//! broadcast(B) ───────────────────────► B (full copy)
//! scatter(A rows by partition) ───────► A_local
//!                                       C_local = TiledMultiplier(A_local, B)
//! gather ◄──────────────────────────── C_local
//! C assembled at partition offsets
//! ```
//!
//! Each rank owns its output rows exclusively, so assembling `C` on the root
//! is a set of disjoint copies. Any collective failure aborts the whole call:
//! no partial `C` is ever returned.

pub mod comm;
pub mod local;
pub mod partition;

use crate::{
    config::MultiplyConfig,
    error::{configuration_error, distribution_failure, Result},
    matmul::TiledMultiplier,
    matrix::{Dims, Matrix},
};

use comm::Communicator;
use partition::{partition, RowPartition};

/// Rank that owns the global operands and receives the result.
pub const ROOT: usize = 0;

/// Drives one process's share of a distributed multiplication.
pub struct Coordinator<C: Communicator> {
    comm: C,
    multiplier: TiledMultiplier,
}

impl<C: Communicator> Coordinator<C> {
    pub fn new(comm: C, config: &MultiplyConfig) -> Result<Self> {
        Ok(Coordinator {
            comm,
            multiplier: TiledMultiplier::new(config)?,
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_root(&self) -> bool {
        self.comm.rank() == ROOT
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    pub fn multiplier(&self) -> &TiledMultiplier {
        &self.multiplier
    }

    /// Row partitions of `A` for this group, indexed by rank.
    pub fn partitions(&self, a_rows: usize) -> Result<Vec<RowPartition>> {
        partition(a_rows, self.comm.size())
    }

    /// Replicates `B` (`a_cols x b_cols`) from the root onto every rank.
    pub fn broadcast_b(&self, b: Option<&Matrix>, dims: Dims) -> Result<Matrix> {
        let data = if self.is_root() {
            let b = b.ok_or_else(|| configuration_error("root rank needs B"))?;
            Some(b.to_vec())
        } else {
            None
        };

        let data = self.comm.broadcast(ROOT, data).inspect_err(|e| log::error!("{e}"))?;
        self.expect_len(data.len(), dims.a_cols * dims.b_cols, "B")?;
        Matrix::from_dense_padded(dims.a_cols, dims.b_cols, &data)
    }

    /// Sends each rank exactly the rows of `A` in its partition and returns
    /// this rank's slice in vector-aligned storage.
    pub fn scatter(
        &self,
        a: Option<&Matrix>,
        partitions: &[RowPartition],
        a_cols: usize,
    ) -> Result<Matrix> {
        let own = partitions.get(self.rank()).ok_or_else(|| {
            configuration_error(format!(
                "{} partitions for a group of {}",
                partitions.len(),
                self.size()
            ))
        })?;

        let chunks = if self.is_root() {
            let a = a.ok_or_else(|| configuration_error("root rank needs A"))?;
            Some(
                partitions
                    .iter()
                    .map(|p| a.rows_to_vec(p.start_row, p.end_row))
                    .collect(),
            )
        } else {
            None
        };

        log::debug!("rank {}: scatter rows {:?}", self.rank(), own.range());
        let data = self.comm.scatter(ROOT, chunks).inspect_err(|e| log::error!("{e}"))?;
        self.expect_len(data.len(), own.len() * a_cols, "A slice")?;
        Matrix::from_dense_padded(own.len(), a_cols, &data)
    }

    /// Collects every rank's output rows on the root and places them at the
    /// offsets given by `partitions`.
    ///
    /// Returns `Some(C)` on the root and `None` elsewhere.
    pub fn gather(&self, local: &Matrix, partitions: &[RowPartition]) -> Result<Option<Matrix>> {
        log::debug!("rank {}: gather {} rows", self.rank(), local.rows());
        let gathered = self
            .comm
            .gather(ROOT, local.to_vec())
            .inspect_err(|e| log::error!("{e}"))?;

        let Some(chunks) = gathered else {
            return Ok(None);
        };
        if chunks.len() != partitions.len() {
            return Err(distribution_failure(
                self.rank(),
                format!(
                    "gathered {} chunks for {} partitions",
                    chunks.len(),
                    partitions.len()
                ),
            ));
        }

        let b_cols = local.cols();
        let a_rows = partitions.last().map_or(0, |p| p.end_row);
        let mut c = Matrix::zeros(a_rows, b_cols)?;
        for (p, chunk) in partitions.iter().zip(chunks) {
            self.expect_len(chunk.len(), p.len() * b_cols, "result rows")?;
            if b_cols == 0 {
                continue;
            }
            for (i, row) in p.range().zip(chunk.chunks_exact(b_cols)) {
                c.row_mut(i).copy_from_slice(row);
            }
        }
        Ok(Some(c))
    }

    /// Computes `C = A * B` across the group.
    ///
    /// The root passes `Some(A)` and `Some(B)`; other ranks pass `None` for
    /// both. Every rank passes the same `dims`. Dimensions are validated
    /// before any communication. The root returns `Some(C)`, other ranks
    /// `None`.
    ///
    /// Scatter and gather are blocking collectives: every rank of the group
    /// must call this method, or the others wait forever.
    pub fn multiply(
        &self,
        a: Option<&Matrix>,
        b: Option<&Matrix>,
        dims: Dims,
    ) -> Result<Option<Matrix>> {
        dims.validate()?;
        if self.is_root() {
            match (a, b) {
                (Some(a), Some(b)) => dims.check_operands(a, b)?,
                _ => return Err(configuration_error("root rank needs both A and B")),
            }
        }
        let partitions = self.partitions(dims.a_rows)?;
        if self.is_root() {
            log::debug!(
                "multiply {}x{}x{} over {} processes: {:?}",
                dims.a_rows,
                dims.a_cols,
                dims.b_cols,
                self.size(),
                partitions
            );
        }

        let b_full = self.broadcast_b(b, dims)?;
        let a_local = self.scatter(a, &partitions, dims.a_cols)?;
        let c_local = self.multiplier.multiply(&a_local, &b_full)?;
        drop(a_local);
        self.gather(&c_local, &partitions)
    }

    fn expect_len(&self, got: usize, expected: usize, what: &str) -> Result<()> {
        if got != expected {
            return Err(distribution_failure(
                self.rank(),
                format!("received {got} elements of {what}, expected {expected}"),
            ));
        }
        Ok(())
    }
}
