//! Error types for distmm operations.
//!
//! Every fallible entry point returns [`Result`]. The three variants mirror the
//! three ways a multiplication can go wrong: bad inputs detected up front, an
//! operand the SIMD fast path cannot accept, and a collective that never
//! completed.

use thiserror::Error;

/// Errors that can occur during a distributed multiplication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistmmError {
    /// Invalid dimensions, process counts or tuning parameters.
    ///
    /// Raised before any communication takes place, so no partial work exists.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Human-readable error message.
        message: String,
    },
    /// An operand does not satisfy the alignment the vector kernel requires.
    ///
    /// Only surfaced under [`AlignmentPolicy::Enforce`](crate::AlignmentPolicy::Enforce);
    /// the default policy copies the operand into aligned scratch instead.
    #[error("Alignment error: {message} (address: {address:#x}, required alignment: {required} bytes)")]
    AlignmentError {
        /// Address of the offending buffer.
        address: usize,
        /// Alignment the kernel needed, in bytes.
        required: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A collective operation did not complete.
    ///
    /// Fatal to the whole call: the result is never partially returned and the
    /// caller must re-issue the entire multiplication.
    #[error("Distribution failure on rank {rank}: {message}")]
    DistributionFailure {
        /// Rank that observed the failure.
        rank: usize,
        /// Human-readable error message.
        message: String,
    },
}

/// Result type alias for distmm operations.
pub type Result<T> = std::result::Result<T, DistmmError>;

/// Creates a configuration error.
pub fn configuration_error(message: impl Into<String>) -> DistmmError {
    DistmmError::ConfigurationError {
        message: message.into(),
    }
}

/// Creates an alignment error.
pub fn alignment_error(address: usize, required: usize, message: impl Into<String>) -> DistmmError {
    DistmmError::AlignmentError {
        address,
        required,
        message: message.into(),
    }
}

/// Creates a distribution failure observed by `rank`.
pub fn distribution_failure(rank: usize, message: impl Into<String>) -> DistmmError {
    DistmmError::DistributionFailure {
        rank,
        message: message.into(),
    }
}
