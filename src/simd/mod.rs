//! Vector kernel: multiply-accumulate runs over contiguous `f64` segments.
//!
//! The kernel is a capability interface ([`DotKernel`]) with one
//! implementation per instruction set and a scalar implementation that every
//! platform has. [`VectorKernel::detect`] picks the widest backend the running
//! CPU supports; nothing is decided at compile time beyond which backends are
//! built at all.
//!
//! | Backend  | Lanes | Alignment | Availability                          |
//! |----------|-------|-----------|---------------------------------------|
//! | AVX-512F | 8     | 64 bytes  | x86_64, rustc >= 1.89 (`cfg(avx512)`) |
//! | AVX2+FMA | 4     | 32 bytes  | x86 / x86_64                          |
//! | NEON     | 2     | 16 bytes  | aarch64                               |
//! | Scalar   | 1     | 8 bytes   | everywhere                            |
//!
//! Vectorization is only ever a speed-up: a run whose pointers miss the
//! backend alignment, and the tail that does not fill a whole vector, go
//! through the scalar loop and produce the same sum up to rounding.

use std::sync::OnceLock;

use crate::{config::KernelPreference, utils::is_aligned};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx2;

#[cfg(all(target_arch = "x86_64", avx512))]
pub mod avx512;

#[cfg(target_arch = "aarch64")]
pub mod neon;

pub mod scalar;

use scalar::{scalar_dot, Scalar};

/// One instruction-set specific dot-product backend.
pub trait DotKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of `f64` lanes processed per instruction.
    fn lanes(&self) -> usize;

    /// Byte alignment the aligned loads need.
    fn alignment(&self) -> usize;

    /// Returns `sum(a[i] * b[i])` for `i < len`.
    ///
    /// # Safety
    ///
    /// - `a` and `b` must be valid for `len` reads and aligned to [`alignment`](Self::alignment)
    /// - `len` must be a multiple of [`lanes`](Self::lanes)
    /// - the running CPU must support the backend's instruction set
    unsafe fn dot_run(&self, a: *const f64, b: *const f64, len: usize) -> f64;
}

static SCALAR: Scalar = Scalar;

/// Handle to the dot-product backend selected for this process.
#[derive(Clone, Copy)]
pub struct VectorKernel {
    backend: &'static dyn DotKernel,
}

impl VectorKernel {
    /// Selects the widest backend supported by the running CPU.
    ///
    /// Detection runs once per process; later calls reuse the result.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<VectorKernel> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let kernel = VectorKernel {
                backend: detect_backend(),
            };
            log::info!(
                "vector kernel: {} ({} lanes, {}-byte alignment)",
                kernel.name(),
                kernel.lanes(),
                kernel.alignment()
            );
            kernel
        })
    }

    /// The portable fallback, regardless of CPU features.
    pub fn scalar() -> Self {
        VectorKernel { backend: &SCALAR }
    }

    pub fn from_preference(preference: KernelPreference) -> Self {
        match preference {
            KernelPreference::Auto => Self::detect(),
            KernelPreference::Scalar => Self::scalar(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn lanes(&self) -> usize {
        self.backend.lanes()
    }

    pub fn alignment(&self) -> usize {
        self.backend.alignment()
    }

    /// Adds `sum(a[i] * b[i])` to `acc`.
    ///
    /// The lane-multiple head of the run takes the vector path when both
    /// segments start on the backend's alignment; the remaining tail, and any
    /// misaligned run, is accumulated with the scalar loop.
    ///
    /// # Panics
    ///
    /// Panics if `a` and `b` have different lengths.
    #[inline]
    pub fn dot(&self, a: &[f64], b: &[f64], acc: f64) -> f64 {
        assert_eq!(a.len(), b.len(), "dot segments must have equal length");

        let lanes = self.backend.lanes();
        let head = a.len() - a.len() % lanes;
        let align = self.backend.alignment();

        let mut sum = acc;
        let mut tail = 0;
        if lanes > 1
            && head > 0
            && is_aligned(a.as_ptr(), align)
            && is_aligned(b.as_ptr(), align)
        {
            // SAFETY: both segments hold at least `head` elements, are aligned
            // as checked above, `head` is a lane multiple, and the backend was
            // only constructed after its CPU feature was detected.
            sum += unsafe { self.backend.dot_run(a.as_ptr(), b.as_ptr(), head) };
            tail = head;
        }
        sum + scalar_dot(&a[tail..], &b[tail..])
    }
}

impl std::fmt::Debug for VectorKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorKernel")
            .field("backend", &self.name())
            .field("lanes", &self.lanes())
            .finish()
    }
}

fn detect_backend() -> &'static dyn DotKernel {
    #[cfg(all(target_arch = "x86_64", avx512))]
    {
        if avx512::is_available() {
            return &avx512::Avx512;
        }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if avx2::is_available() {
            return &avx2::Avx2;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if neon::is_available() {
            return &neon::Neon;
        }
    }

    &SCALAR
}
