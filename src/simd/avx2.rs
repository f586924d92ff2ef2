//! AVX2 + FMA backend: 4 doubles per 256-bit register.
//!
//! Available on Intel Haswell (2013+) and AMD Excavator (2015+). Selected at
//! runtime through `is_x86_feature_detected!`, so the crate itself is built
//! without any `target-feature` flags.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::DotKernel;

/// AVX2 memory alignment requirement in bytes.
pub(crate) const AVX_ALIGNMENT: usize = 32;

/// Number of f64 elements that fit in a 256-bit vector.
pub(crate) const LANE_COUNT: usize = 4;

pub struct Avx2;

impl DotKernel for Avx2 {
    fn name(&self) -> &'static str {
        "avx2+fma"
    }

    fn lanes(&self) -> usize {
        LANE_COUNT
    }

    fn alignment(&self) -> usize {
        AVX_ALIGNMENT
    }

    unsafe fn dot_run(&self, a: *const f64, b: *const f64, len: usize) -> f64 {
        dot_avx2(a, b, len)
    }
}

pub(crate) fn is_available() -> bool {
    is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
}

/// Two independent accumulators hide the FMA latency on the 8-wide steps.
#[target_feature(enable = "avx2,fma")]
unsafe fn dot_avx2(a: *const f64, b: *const f64, len: usize) -> f64 {
    debug_assert_eq!(len % LANE_COUNT, 0);

    let mut acc0 = _mm256_setzero_pd();
    let mut acc1 = _mm256_setzero_pd();

    let mut i = 0;
    while i + 2 * LANE_COUNT <= len {
        let a0 = _mm256_load_pd(a.add(i));
        let b0 = _mm256_load_pd(b.add(i));
        let a1 = _mm256_load_pd(a.add(i + LANE_COUNT));
        let b1 = _mm256_load_pd(b.add(i + LANE_COUNT));
        acc0 = _mm256_fmadd_pd(a0, b0, acc0);
        acc1 = _mm256_fmadd_pd(a1, b1, acc1);
        i += 2 * LANE_COUNT;
    }
    while i < len {
        let a0 = _mm256_load_pd(a.add(i));
        let b0 = _mm256_load_pd(b.add(i));
        acc0 = _mm256_fmadd_pd(a0, b0, acc0);
        i += LANE_COUNT;
    }

    horizontal_sum(_mm256_add_pd(acc0, acc1))
}

#[target_feature(enable = "avx2")]
unsafe fn horizontal_sum(v: __m256d) -> f64 {
    let low = _mm256_castpd256_pd128(v);
    let high = _mm256_extractf128_pd(v, 1);
    let pair = _mm_add_pd(low, high);
    let swapped = _mm_unpackhi_pd(pair, pair);
    _mm_cvtsd_f64(_mm_add_sd(pair, swapped))
}
