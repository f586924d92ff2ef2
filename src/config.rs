//! Tuning knobs for a multiplication.

use crate::{
    error::{configuration_error, Result},
    DEFAULT_TILE_SIZE,
};

/// What to do with an operand whose rows do not start on a vector boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentPolicy {
    /// Copy the operand into aligned, padded scratch and carry on.
    #[default]
    Fallback,
    /// Reject the operand with an alignment error before any work.
    Enforce,
}

/// Which dot-product backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelPreference {
    /// Widest backend supported by the running CPU.
    #[default]
    Auto,
    /// Portable scalar loop.
    Scalar,
}

/// Configuration shared by the tiled multiplier and the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplyConfig {
    /// Edge length `T` of the square tiles.
    pub tile_size: usize,
    /// Worker threads per process; `None` uses Rayon's global pool.
    pub threads: Option<usize>,
    /// Handling of operands whose rows miss the kernel alignment.
    pub alignment: AlignmentPolicy,
    /// Dot-product backend selection.
    pub kernel: KernelPreference,
}

impl Default for MultiplyConfig {
    fn default() -> Self {
        MultiplyConfig {
            tile_size: DEFAULT_TILE_SIZE,
            threads: None,
            alignment: AlignmentPolicy::default(),
            kernel: KernelPreference::default(),
        }
    }
}

impl MultiplyConfig {
    /// Sets the tile edge length. Values larger than every matrix extent
    /// behave like a single tile.
    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Runs the tiled product on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the policy for operands whose rows are not vector aligned.
    pub fn with_alignment(mut self, alignment: AlignmentPolicy) -> Self {
        self.alignment = alignment;
        self
    }

    /// Selects the dot-product backend regardless of what the CPU detects.
    pub fn with_kernel(mut self, kernel: KernelPreference) -> Self {
        self.kernel = kernel;
        self
    }

    /// Checks that the tile size and thread count are at least 1.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(configuration_error("tile size must be at least 1"));
        }
        if self.threads == Some(0) {
            return Err(configuration_error("thread count must be at least 1"));
        }
        Ok(())
    }

    /// Overrides fields from `DISTMM_*` environment variables.
    ///
    /// - `DISTMM_TILE_SIZE`: positive integer
    /// - `DISTMM_THREADS`: positive integer
    /// - `DISTMM_ALIGNMENT`: `fallback` or `enforce`
    /// - `DISTMM_KERNEL`: `auto` or `scalar`
    ///
    /// Values that do not parse are ignored.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    fn override_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DISTMM_TILE_SIZE") {
            match val.trim().parse::<usize>() {
                Ok(tile) if tile > 0 => self.tile_size = tile,
                _ => log::warn!("ignoring DISTMM_TILE_SIZE={val}"),
            }
        }

        if let Some(val) = lookup("DISTMM_THREADS") {
            match val.trim().parse::<usize>() {
                Ok(threads) if threads > 0 => self.threads = Some(threads),
                _ => log::warn!("ignoring DISTMM_THREADS={val}"),
            }
        }

        if let Some(val) = lookup("DISTMM_ALIGNMENT") {
            match val.trim() {
                "fallback" => self.alignment = AlignmentPolicy::Fallback,
                "enforce" => self.alignment = AlignmentPolicy::Enforce,
                _ => log::warn!("ignoring DISTMM_ALIGNMENT={val}"),
            }
        }

        if let Some(val) = lookup("DISTMM_KERNEL") {
            match val.trim() {
                "auto" => self.kernel = KernelPreference::Auto,
                "scalar" => self.kernel = KernelPreference::Scalar,
                _ => log::warn!("ignoring DISTMM_KERNEL={val}"),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MultiplyConfig::default();
        assert_eq!(config.tile_size, DEFAULT_TILE_SIZE);
        assert_eq!(config.threads, None);
        assert_eq!(config.alignment, AlignmentPolicy::Fallback);
        assert_eq!(config.kernel, KernelPreference::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(MultiplyConfig::default().with_tile_size(0).validate().is_err());
        assert!(MultiplyConfig::default().with_threads(0).validate().is_err());
    }

    #[test]
    fn test_override_from_env() {
        let config = MultiplyConfig::default().override_from(env(&[
            ("DISTMM_TILE_SIZE", "16"),
            ("DISTMM_THREADS", "3"),
            ("DISTMM_ALIGNMENT", "enforce"),
            ("DISTMM_KERNEL", "scalar"),
        ]));
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.alignment, AlignmentPolicy::Enforce);
        assert_eq!(config.kernel, KernelPreference::Scalar);
    }

    #[test]
    fn test_override_ignores_garbage() {
        let config = MultiplyConfig::default().override_from(env(&[
            ("DISTMM_TILE_SIZE", "0"),
            ("DISTMM_THREADS", "many"),
            ("DISTMM_KERNEL", "gpu"),
        ]));
        assert_eq!(config, MultiplyConfig::default());
    }
}
