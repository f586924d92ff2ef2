//! Process-group abstraction used by the coordinator.
//!
//! A [`Communicator`] is an explicit handle on the group of processes taking
//! part in a multiplication; nothing is queried from ambient global state.
//! All three collectives are rooted and blocking: every member of the group
//! must enter the same collective, in the same order, before any of them
//! returns. A member that never arrives blocks the others indefinitely.

use crate::error::{configuration_error, Result};

pub trait Communicator: Send {
    /// Index of this process within the group, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Replicates `data` from `root` to every process.
    ///
    /// `data` must be `Some` on the root and is ignored elsewhere.
    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>>;

    /// Sends `chunks[r]` from `root` to rank `r` and returns this rank's chunk.
    ///
    /// `chunks` must be `Some` with exactly `size()` entries on the root and is
    /// ignored elsewhere. Chunks may have different lengths.
    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>>;

    /// Collects every rank's `chunk` on `root`, in rank order.
    ///
    /// Returns `Some` on the root and `None` on every other rank.
    fn gather(&self, root: usize, chunk: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>>;
}

/// A group of one: every collective is a local move.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl SingleProcess {
    fn check_root(root: usize) -> Result<()> {
        if root != 0 {
            return Err(configuration_error(format!(
                "root {root} is outside a single-process group"
            )));
        }
        Ok(())
    }
}

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast(&self, root: usize, data: Option<Vec<f64>>) -> Result<Vec<f64>> {
        Self::check_root(root)?;
        data.ok_or_else(|| configuration_error("broadcast root supplied no data"))
    }

    fn scatter(&self, root: usize, chunks: Option<Vec<Vec<f64>>>) -> Result<Vec<f64>> {
        Self::check_root(root)?;
        let mut chunks = chunks.ok_or_else(|| configuration_error("scatter root supplied no chunks"))?;
        if chunks.len() != 1 {
            return Err(configuration_error(format!(
                "scatter needs 1 chunk, got {}",
                chunks.len()
            )));
        }
        Ok(chunks.remove(0))
    }

    fn gather(&self, root: usize, chunk: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>> {
        Self::check_root(root)?;
        Ok(Some(vec![chunk]))
    }
}
