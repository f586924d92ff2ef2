//! AVX-512F backend: 8 doubles per 512-bit register.
//!
//! Only compiled when `build.rs` found a toolchain with stable AVX-512
//! intrinsics (`cfg(avx512)`); only selected when the CPU reports `avx512f`.

use std::arch::x86_64::*;

use super::DotKernel;

/// AVX-512 memory alignment requirement in bytes.
pub(crate) const AVX512_ALIGNMENT: usize = 64;

/// Number of f64 elements that fit in a 512-bit vector.
pub(crate) const LANE_COUNT: usize = 8;

pub struct Avx512;

impl DotKernel for Avx512 {
    fn name(&self) -> &'static str {
        "avx512f"
    }

    fn lanes(&self) -> usize {
        LANE_COUNT
    }

    fn alignment(&self) -> usize {
        AVX512_ALIGNMENT
    }

    unsafe fn dot_run(&self, a: *const f64, b: *const f64, len: usize) -> f64 {
        dot_avx512(a, b, len)
    }
}

pub(crate) fn is_available() -> bool {
    is_x86_feature_detected!("avx512f")
}

#[target_feature(enable = "avx512f")]
unsafe fn dot_avx512(a: *const f64, b: *const f64, len: usize) -> f64 {
    debug_assert_eq!(len % LANE_COUNT, 0);

    let mut acc0 = _mm512_setzero_pd();
    let mut acc1 = _mm512_setzero_pd();

    let mut i = 0;
    while i + 2 * LANE_COUNT <= len {
        let a0 = _mm512_load_pd(a.add(i));
        let b0 = _mm512_load_pd(b.add(i));
        let a1 = _mm512_load_pd(a.add(i + LANE_COUNT));
        let b1 = _mm512_load_pd(b.add(i + LANE_COUNT));
        acc0 = _mm512_fmadd_pd(a0, b0, acc0);
        acc1 = _mm512_fmadd_pd(a1, b1, acc1);
        i += 2 * LANE_COUNT;
    }
    while i < len {
        let a0 = _mm512_load_pd(a.add(i));
        let b0 = _mm512_load_pd(b.add(i));
        acc0 = _mm512_fmadd_pd(a0, b0, acc0);
        i += LANE_COUNT;
    }

    _mm512_reduce_add_pd(_mm512_add_pd(acc0, acc1))
}
