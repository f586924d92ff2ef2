//! Row-block partitioning of `A` across processes.

use std::ops::Range;

use crate::error::{configuration_error, Result};

/// Contiguous half-open range `[start_row, end_row)` of `A`'s rows owned by
/// one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowPartition {
    pub start_row: usize,
    pub end_row: usize,
}

impl RowPartition {
    pub fn new(start_row: usize, end_row: usize) -> Self {
        debug_assert!(start_row <= end_row);
        RowPartition { start_row, end_row }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end_row - self.start_row
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.start_row == self.end_row
    }

    pub fn range(&self) -> Range<usize> {
        self.start_row..self.end_row
    }
}

/// Splits `a_rows` rows into `process_count` contiguous partitions.
///
/// Every partition gets `a_rows / process_count` rows and the last one also
/// takes the `a_rows % process_count` remainder, so the partitions cover
/// `[0, a_rows)` exactly once, in rank order.
///
/// # Errors
///
/// Returns a configuration error if `process_count` is zero or if
/// `a_rows < process_count` (some partition would be empty).
pub fn partition(a_rows: usize, process_count: usize) -> Result<Vec<RowPartition>> {
    if process_count == 0 {
        return Err(configuration_error("process count must be positive"));
    }
    if a_rows < process_count {
        return Err(configuration_error(format!(
            "{a_rows} rows cannot give each of {process_count} processes at least one row"
        )));
    }

    let rows_per_process = a_rows / process_count;
    let partitions = (0..process_count)
        .map(|rank| {
            let start = rank * rows_per_process;
            let end = if rank + 1 == process_count {
                a_rows
            } else {
                start + rows_per_process
            };
            RowPartition::new(start, end)
        })
        .collect();

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(a_rows: usize, partitions: &[RowPartition]) {
        let mut next = 0;
        for p in partitions {
            assert_eq!(p.start_row, next, "gap or overlap at row {next}");
            assert!(!p.is_empty());
            next = p.end_row;
        }
        assert_eq!(next, a_rows);
    }

    #[test]
    fn test_even_split() {
        let partitions = partition(12, 4).unwrap();
        assert_eq!(partitions.len(), 4);
        assert!(partitions.iter().all(|p| p.len() == 3));
        assert_exact_cover(12, &partitions);
    }

    #[test]
    fn test_remainder_goes_to_last_partition() {
        let partitions = partition(10, 3).unwrap();
        assert_eq!(
            partitions,
            vec![
                RowPartition::new(0, 3),
                RowPartition::new(3, 6),
                RowPartition::new(6, 10)
            ]
        );
    }

    #[test]
    fn test_exact_cover_for_all_small_cases() {
        for a_rows in 1..=40 {
            for process_count in 1..=a_rows {
                let partitions = partition(a_rows, process_count).unwrap();
                assert_eq!(partitions.len(), process_count);
                assert_exact_cover(a_rows, &partitions);
            }
        }
    }

    #[test]
    fn test_invalid_counts() {
        assert!(partition(10, 0).is_err());
        assert!(partition(3, 4).is_err());
        assert!(partition(0, 1).is_err());
    }
}
